//! Type registry tests: resolution, registration and narrow formats
