//! Shelf Module
//!
//! A user's personal shelf of exams: which ones they saved, which ones they
//! flashed, and how the saved ones are organized into folders.
//!
//! # Invariants
//!
//! - An exam that sits in any of a user's folders is also in their saved set.
//!   Unsaving cascades out of every folder; placing into folders always saves.
//! - An exam's lightning count moves by exactly one per flash or unflash, in
//!   the same transaction as the membership change.
//!
//! # Usage
//!
//! ```rust,ignore
//! use examshelf::shelf;
//!
//! let app = Router::new()
//!     .nest("/api/exams", shelf::routes())
//!     .with_state(app_state);
//!
//! let shelf = shelf::Shelf::new(db.as_ref(), &views);
//! let state = shelf.toggle_save(&user_id, &exam_id).await?;
//! ```

mod handler;
mod lib;
mod routes;

pub use lib::*;

pub use routes::routes;
