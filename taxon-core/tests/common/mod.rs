// Shared fixtures: a small slice of the NUCC taxonomy in its three input shapes

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use taxon_core::Table;

pub const TREE_JSON: &str = r#"[
    {"id": 1, "pId": 0, "name": "Individual or Groups (of Individuals)"},
    {"id": 2, "pId": 0, "name": "Non-individual"},
    {"id": 5, "pId": 0, "name": "Comment"},
    {"id": 14, "pId": 2, "name": "Ambulatory Health Care Facilities"},
    {"id": 2496, "pId": 14, "name": "Clinic/Center"},
    {"id": 2500, "pId": 2496, "name": "Ambulatory Family Planning Facility"},
    {"id": 2712, "pId": 2, "name": "Comment"},
    {"id": 2800, "pId": 2712, "name": "Under a comment"},
    {"id": 9999, "pId": 2, "name": "Never scraped"}
]"#;

pub const DOWNLOAD_CSV: &str = "\
Code,Grouping,Classification,Specialization,Definition,Notes,Display Name,Section
261Q00000X,Ambulatory Health Care Facilities,Clinic/Center,,A facility providing care.,,Clinic/Center,Non-individual
261QA1903X,Ambulatory Health Care Facilities,Clinic/Center,Ambulatory Family Planning Facility,A facility providing family planning.,,Ambulatory Family Planning Facility,Non-individual
999900000X,Other Service Providers,Example,,Only published in the download.,,Example,Non-individual
";

pub const SCRAPED_CSV: &str = "\
code_id,code_text,code_long_name,code_short_name,code_definition,code_notes,code_effective_date,last_modified_date,immediate_parent_code_id
1,,Individual or Groups (of Individuals),,,,,,
2,,Non-individual,,,,,,
14,,Ambulatory Health Care Facilities,,,,,,2
2496,261Q00000X,Clinic/Center,Clinic/Center,A facility providing care.,,07/01/2003,,14
2500,261QA1903X,Clinic/Center - Ambulatory Family Planning Facility,Ambulatory Family Planning Facility,A facility providing family planning.,\"Source: Example Org, www.example.org [7/1/2003: new]\",07/01/2003,,2496
2800,,Under a comment,,,,,,2712
";

pub fn table(csv_text: &str) -> Table {
    Table::from_reader(csv_text.as_bytes()).unwrap()
}

pub fn write_fixture(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}
