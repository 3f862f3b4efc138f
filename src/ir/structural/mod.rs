pub mod discretisation;
