pub mod run;
pub mod service;
pub mod settings;
pub mod tunnel;
pub mod web;
