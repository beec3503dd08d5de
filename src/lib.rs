/*
 * SPDX-FileCopyrightText: 2025 Sven Shi
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

//! dnsflow - a pluggable DNS request pipeline
//!
//! Queries received by server plugins run through chains of executor
//! plugins assembled from the configuration file. Every long-lived activity
//! is attached to a shared [`core::lifecycle::Lifecycle`] so the process can
//! drain them before exiting.

pub mod config;
pub mod core;
pub mod plugin;
