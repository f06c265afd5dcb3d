//! Device context tests: lifecycle, placement and memory accounting
