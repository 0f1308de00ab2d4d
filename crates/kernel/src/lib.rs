//! Stagehand kernel library.
//!
//! Staged, dependency-aware activation of pluggable feature modules inside a
//! long-lived client shell. The kernel owns the module registry, dependency
//! resolution, condition gating, level-grouped concurrent activation, and the
//! sequential bootstrap pipeline that drives them. Rendering, routing,
//! localization, and authorization are external collaborators reached through
//! the traits in [`route`], [`locale`], and [`access`].

pub mod access;
pub mod bootstrap;
pub mod config;
pub mod context;
pub mod error;
pub mod locale;
pub mod manifest;
pub mod module;
pub mod route;
