//! Shared toy-track builders for the end-to-end tests.

#![allow(dead_code)]

pub mod toy_tracks;
