//! Math function tests - numpy compatible
