pub mod aggregation;
pub mod editor;
pub mod normalizer;
pub mod persistence;
pub mod report;
pub mod rules;
