pub mod cleanup;
pub mod create;
pub mod datacenters;
pub mod init;
pub mod node_class;
pub mod show;
pub mod validate;
