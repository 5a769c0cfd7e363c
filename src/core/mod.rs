pub mod viewmodels;
