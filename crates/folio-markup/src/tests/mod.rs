//! Test suites for folio-markup.

mod unit;
