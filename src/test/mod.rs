mod accounts;
mod db;
mod utils;

pub use utils::test_utils;
