use geopin_assistant::catalog_schema;

use crate::util::print_json;

pub fn run() -> i32 {
    print_json(&catalog_schema())
}
