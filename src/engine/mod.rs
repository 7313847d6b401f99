pub mod aggregate;
pub mod combiner;
pub mod detectors;
pub mod extractor;
pub mod git;
pub mod lineage;
pub mod mining;
pub mod parser;
pub mod report;
pub mod tokens;
