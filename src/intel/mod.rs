pub mod datacenter;
pub mod dataset;
pub mod ip;
pub mod tor;
pub mod vpn;
