pub mod trustdtos;
