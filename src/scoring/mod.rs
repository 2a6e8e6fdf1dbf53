pub mod bot;
pub mod fingerprint;
pub mod pipeline;
pub mod risk;
