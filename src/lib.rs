pub mod config;
pub mod ec2;
pub mod interactive;
pub mod select;
