mod list;
mod run;
mod show_key;

pub use list::handle_list;
pub use run::handle_run;
pub use show_key::handle_show_key;

use std::path::Path;

use tilesmith::testbed::scenario::{ScenarioRow, builtin_rows, load_rows};

/// Rows from `path`, or the built-in table when no path is given.
fn scenario_rows(path: Option<&Path>) -> Result<Vec<ScenarioRow>, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(load_rows(path)?),
        None => Ok(builtin_rows()),
    }
}
