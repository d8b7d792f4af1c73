//! CLI command helper tests

mod test_build;
mod test_extract;
mod test_query;
