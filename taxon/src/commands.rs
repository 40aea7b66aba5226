use crate::CLAP_STYLING;
use clap::{arg, command};
use std::path::PathBuf;
use taxon_scanner::fetcher::DEFAULT_BASE_URL;
use url::Url;

const DEFAULT_DATA_DIR: &str = "./data";

fn data_dir_arg() -> clap::Arg {
    arg!(-d --"data-dir" <DIR>)
        .required(false)
        .help("Directory holding every artifact of a run")
        .default_value(DEFAULT_DATA_DIR)
}

fn db_arg() -> clap::Arg {
    arg!(--"db" <PATH>)
        .required(false)
        .help("Record the run in a SQLite ledger at this path")
}

fn path_arg(arg: clap::Arg) -> clap::Arg {
    arg.value_parser(clap::value_parser!(PathBuf))
}

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("taxon")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("taxon")
        .about("Scrape, reconcile and verify a hierarchical code taxonomy")
        .styles(CLAP_STYLING)
        .arg(
            arg!(-q --"quiet" "Only print warnings and errors")
                .required(false)
                .global(true)
                .conflicts_with("verbose"),
        )
        .arg(
            arg!(-v --"verbose" "Print per-node detail")
                .required(false)
                .global(true),
        )
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            command!("ancestors")
                .about("Build the ancestor closure from the taxonomy tree")
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(false)
                        .help("Landing page embedding the tree")
                        .value_parser(clap::value_parser!(Url))
                        .default_value(DEFAULT_BASE_URL)
                        .conflicts_with("tree-file"),
                )
                .arg(path_arg(
                    arg!(-t --"tree-file" <PATH>)
                        .required(false)
                        .help("Saved landing page or JSON node list to read instead of the URL"),
                ))
                .arg(data_dir_arg())
                .arg(
                    arg!(--"exclude" <IDS>)
                        .required(false)
                        .help("Comma separated node ids to leave out of the closure (empty for none)")
                        .default_value("5,2712,2714"),
                )
                .arg(
                    arg!(--"timeout" <SECONDS>)
                        .required(false)
                        .help("Request timeout in seconds")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("30"),
                ),
        )
        .subcommand(
            command!("nodes")
                .about("Download the attribute page of every node in the closure")
                .arg(data_dir_arg())
                .arg(
                    arg!(-b --"base-url" <URL>)
                        .required(false)
                        .help("Site serving the node pages")
                        .value_parser(clap::value_parser!(Url))
                        .default_value(DEFAULT_BASE_URL),
                )
                .arg(
                    arg!(-w --"workers" <NUM_WORKERS>)
                        .required(false)
                        .help("Concurrent page downloads")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("8"),
                )
                .arg(
                    arg!(--"max-age-hours" <HOURS>)
                        .required(false)
                        .help("Reuse cached pages younger than this")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("24"),
                )
                .arg(
                    arg!(--"timeout" <SECONDS>)
                        .required(false)
                        .help("Request timeout in seconds")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("30"),
                ),
        )
        .subcommand(
            command!("reconcile")
                .about("Join the downloaded flat table with the scraped node table")
                .arg(path_arg(
                    arg!(--"download-csv" <PATH>)
                        .required(true)
                        .help("Official flat table with a Code column"),
                ))
                .arg(path_arg(
                    arg!(--"scraped-csv" <PATH>)
                        .required(true)
                        .help("Scraped node table with a code_text column"),
                ))
                .arg(path_arg(
                    arg!(--"ancestors" <PATH>)
                        .required(false)
                        .help("Closure CSV for the coverage check (default: the data dir's)"),
                ))
                .arg(data_dir_arg()),
        )
        .subcommand(
            command!("verify")
                .about("Check expected lineages against the closure and parent pointers")
                .arg(data_dir_arg())
                .arg(path_arg(
                    arg!(--"ancestors" <PATH>)
                        .required(false)
                        .help("Closure CSV (default: the data dir's)"),
                ))
                .arg(path_arg(
                    arg!(--"merged" <PATH>)
                        .required(false)
                        .help("Reconciled CSV (default: the data dir's)"),
                ))
                .arg(path_arg(
                    arg!(--"lineages" <PATH>)
                        .required(false)
                        .help("JSON file of [{\"name\", \"chain\"}] lineages (default: built-in)"),
                ))
                .arg(path_arg(
                    arg!(--"supplemental" <PATH>)
                        .required(false)
                        .help("JSON file of structural node attributes (default: built-in)"),
                ))
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format: text, json")
                        .value_parser(["text", "json"])
                        .default_value("text"),
                )
                .arg(path_arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Save report to file (default: verification_report.<format> in the data dir)"),
                ))
                .arg(db_arg()),
        )
        .subcommand(
            command!("sources")
                .about("Extract source citations and URLs from node notes")
                .arg(data_dir_arg())
                .arg(path_arg(
                    arg!(--"nodes-csv" <PATH>)
                        .required(false)
                        .help("Scraped node table (default: the data dir's)"),
                ))
                .arg(path_arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Citation CSV to write (default: the data dir's)"),
                )),
        )
        .subcommand(
            command!("run")
                .about("Closure, reconciliation and verification from local files")
                .arg(path_arg(
                    arg!(-t --"tree-file" <PATH>)
                        .required(true)
                        .help("Saved landing page or JSON node list"),
                ))
                .arg(path_arg(
                    arg!(--"download-csv" <PATH>)
                        .required(true)
                        .help("Official flat table with a Code column"),
                ))
                .arg(path_arg(
                    arg!(--"scraped-csv" <PATH>)
                        .required(true)
                        .help("Scraped node table with a code_text column"),
                ))
                .arg(data_dir_arg())
                .arg(path_arg(
                    arg!(--"lineages" <PATH>)
                        .required(false)
                        .help("JSON file of lineages (default: built-in)"),
                ))
                .arg(path_arg(
                    arg!(--"supplemental" <PATH>)
                        .required(false)
                        .help("JSON file of structural node attributes (default: built-in)"),
                ))
                .arg(db_arg()),
        )
}
