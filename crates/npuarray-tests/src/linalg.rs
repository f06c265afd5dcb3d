//! Linear algebra tests - numpy compatible
