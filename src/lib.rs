pub mod cache;
pub mod config;
pub mod db;
pub mod digest;
pub mod model;
pub mod report;
pub mod stats;
pub mod web;
pub mod webhook;
