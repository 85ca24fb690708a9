pub mod footer;
pub mod header;
pub mod render;
pub mod run_list;
pub mod run_section;
pub mod spinner;
