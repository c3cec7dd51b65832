//! Integration tests for `kc-bootstrap`; see the `tests/` directory.
