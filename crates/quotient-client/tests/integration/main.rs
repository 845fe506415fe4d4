mod common;
mod intelligence_tests;
mod pipeline_tests;
