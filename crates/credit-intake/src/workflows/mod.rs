pub mod credit_risk;
