//! Recovery manager test suite

mod recovery_tests;
