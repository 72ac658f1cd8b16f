//! Pipeline stages for slide-deck generation.
//!
//! Each submodule implements one step. Keeping stages separate makes each
//! independently testable and lets a caller swap the language model or the
//! image backend (via [`llm::TextGenerator`] and [`images::ImageSource`])
//! without touching the rest.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ llm ──▶ images ──▶ layout ──▶ render
//! (text)   (slides) (assets)  (plan)    (pdfium)
//! ```
//!
//! 1. [`input`]   turn a topic or an upload into plain-text source material;
//!    [`summary`] describes CSV data, [`pdfium`] extracts PDF text
//! 2. [`llm`]     prompt the model with retry/backoff and a per-call timeout;
//!    [`parse`] validates the reply slide by slide
//! 3. [`images`]  search and download one illustration per slide, fanned out
//!    with bounded concurrency
//! 4. [`layout`]  pure page planner: positions, font shrinking, truncation
//! 5. [`render`]  execute the plans with pdfium in `spawn_blocking`

pub mod images;
pub mod input;
pub mod layout;
pub mod llm;
pub mod parse;
pub mod pdfium;
pub mod render;
pub mod summary;
