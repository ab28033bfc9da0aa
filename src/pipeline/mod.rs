//! Pipeline stages for receipt extraction.
//!
//! Each submodule implements one transformation step, so each can be tested
//! on its own and the orchestrator in [`crate::run`] only wires them together.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ llm ──▶ parse ──▶ geometry ──▶ extract
//! (folders) (pdfium)   (base64)   (VLM)   (JSON)    (boxes)      (crops)
//! ```
//!
//! 1. [`input`]    — list PDFs and page images, name output files
//! 2. [`render`]   — rasterise PDF pages at a fixed DPI with contrast boost;
//!    runs in `spawn_blocking` because pdfium is not async-safe
//! 3. [`encode`]   — base64-wrap page file bytes for the multimodal request
//! 4. [`llm`]      — drive the VLM call with retry/backoff; the only stage
//!    with network I/O
//! 5. [`parse`]    — pull region descriptors out of free-form model text
//! 6. [`geometry`] — turn one descriptor into a clamped axis-aligned box
//! 7. [`extract`]  — pad, clamp and crop every valid box

pub mod encode;
pub mod extract;
pub mod geometry;
pub mod input;
pub mod llm;
pub mod parse;
pub mod render;
