pub mod ddl_log;
pub mod run;
