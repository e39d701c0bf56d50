//! Contract test runner for core_types
