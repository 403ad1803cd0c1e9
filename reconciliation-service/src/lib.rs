//! Reconciliation engine: pairs unmatched bank debits with captured receipts
//! or scheduled company expenses, with confidence tiers and discrepancy
//! flagging.

pub mod config;
pub mod dtos;
pub mod handlers;
pub mod matching;
pub mod middleware;
pub mod models;
pub mod repository;
pub mod services;
pub mod startup;
