//! Format codecs: decoding sources into plain data and encoding plain data
//! into target files.
//!
//! Each submodule owns exactly one container format. Routines in
//! [`crate::routine`] compose them: a docx→txt routine is
//! [`docx::read_paragraphs`] followed by a UTF-8 write, a csv→xlsx routine is
//! [`delimited::read_records`] followed by [`xlsx::write_workbook`].
//!
//! ## Data Flow
//!
//! ```text
//! docx ─┐                       ┌─▶ txt
//! pptx ─┼─▶ text blocks ────────┼─▶ docx
//! pdf  ─┘                       └─▶ pdf (text layout)
//!
//! xlsx ─┬─▶ records ────────────┬─▶ csv / tsv
//! csv  ─┘                       └─▶ xlsx
//!
//! jpg/jpeg/png/bmp ─▶ pixels ─┬─▶ png / jpeg
//!                             └─▶ jpeg artifact ─▶ pdf
//! ```
//!
//! Codecs never touch the target path directly: encoders return bytes and
//! the routine writes them in one go, so a failed encode leaves nothing
//! behind.

pub mod delimited;
pub mod docx;
pub mod ooxml;
pub mod pdf;
pub mod pptx;
pub mod raster;
pub mod xlsx;
