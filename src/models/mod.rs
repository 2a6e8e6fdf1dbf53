pub mod signals;
pub mod verdict;
pub mod visitor;
