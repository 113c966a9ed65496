pub mod demo;
pub mod grade_tonnage;
pub mod network;
pub mod summary;
