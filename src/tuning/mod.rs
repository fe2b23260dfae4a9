pub mod config_tester;

pub use config_tester::{ConfigResult, ConfigTester, Configuration, RunResult, Summary};
