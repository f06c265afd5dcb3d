//! Broadcasting tests - numpy compatible
