pub mod env_file;
pub mod process_group;
