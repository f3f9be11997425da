pub mod incidence_use_case;
pub mod ports;
