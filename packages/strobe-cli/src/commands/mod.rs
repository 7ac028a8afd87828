pub mod config;
pub mod control;
pub mod run;
pub mod scan;
pub mod send;
