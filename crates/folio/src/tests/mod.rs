//! Test suites for the content update engine.

mod observer;
mod support;
mod unit;
