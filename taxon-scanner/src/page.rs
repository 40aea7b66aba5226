use crate::error::{Result, ScanError};
use crate::result::NodeRecord;
use scraper::{ElementRef, Html, Selector};

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| ScanError::ParseError(format!("bad selector {}: {}", css, e)))
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}

/// Map a node page's `<h1>` and attribute table onto a [`NodeRecord`].
pub fn parse_node_html(node_id: &str, html: &str) -> Result<NodeRecord> {
    let document = Html::parse_fragment(html);
    let mut record = NodeRecord::new(node_id);

    if let Some(h1) = document.select(&selector("h1")?).next() {
        record.code_long_name = cell_text(h1);
    }

    let Some(table) = document.select(&selector("table")?).next() else {
        return Ok(record);
    };

    let row_selector = selector("tr")?;
    let cell_selector = selector("td, th")?;

    for row in table.select(&row_selector) {
        let cells: Vec<ElementRef<'_>> = row.select(&cell_selector).collect();
        if cells.len() < 2 {
            continue;
        }
        let key = cell_text(cells[0]);
        let value = cell_text(cells[1]);

        match key.to_lowercase().as_str() {
            "name" => record.code_short_name = value,
            "code" => record.code_text = value,
            "definition" | "description" => record.code_definition = value,
            "notes" | "note" => record.code_notes = value,
            "effective date" | "effectivedate" => record.code_effective_date = value,
            "last modified" | "lastmodified" | "modified" | "last modified date" => {
                record.last_modified_date = value
            }
            "deactivation date" => record.deactivation_date = Some(value),
            _ => {
                record.extra.insert(key, value);
            }
        }
    }

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NODE_PAGE: &str = r#"
        <h1> Clinic/Center - Ambulatory Family Planning Facility </h1>
        <table>
            <tr><th>Name</th><td>Ambulatory Family Planning Facility</td></tr>
            <tr><td>Code</td><td> 261QA1903X </td></tr>
            <tr><td>Definition</td><td>A facility providing family planning.</td></tr>
            <tr><td>Note</td><td>Source: Example Org, www.example.org [7/1/2003: new]</td></tr>
            <tr><td>Effective Date</td><td>07/01/2003</td></tr>
            <tr><td>Last Modified</td><td>01/01/2020</td></tr>
            <tr><td>Deactivation Date</td><td>12/31/2030</td></tr>
            <tr><td>Grouping</td><td>Ambulatory Health Care Facilities</td></tr>
            <tr><td>single cell</td></tr>
        </table>"#;

    #[test]
    fn test_parse_known_fields() {
        let record = parse_node_html("2500", NODE_PAGE).unwrap();
        assert_eq!(record.code_id, "2500");
        assert_eq!(
            record.code_long_name,
            "Clinic/Center - Ambulatory Family Planning Facility"
        );
        assert_eq!(record.code_short_name, "Ambulatory Family Planning Facility");
        assert_eq!(record.code_text, "261QA1903X");
        assert_eq!(record.code_definition, "A facility providing family planning.");
        assert!(record.code_notes.starts_with("Source:"));
        assert_eq!(record.code_effective_date, "07/01/2003");
        assert_eq!(record.last_modified_date, "01/01/2020");
        assert_eq!(record.deactivation_date.as_deref(), Some("12/31/2030"));
    }

    #[test]
    fn test_unknown_fields_pass_through() {
        let record = parse_node_html("2500", NODE_PAGE).unwrap();
        assert_eq!(
            record.extra.get("Grouping").map(String::as_str),
            Some("Ambulatory Health Care Facilities")
        );
        assert!(!record.extra.contains_key("single cell"));
    }

    #[test]
    fn test_page_without_table() {
        let record = parse_node_html("14", "<h1>Ambulatory Health Care Facilities</h1>").unwrap();
        assert_eq!(record.code_long_name, "Ambulatory Health Care Facilities");
        assert!(record.code_text.is_empty());
        assert!(record.extra.is_empty());
    }
}
