//! Loss functions for cascade training.
//!
//! - Cascade loss: per-head cross-entropy with KL alignment of shallow heads
//!   to the deepest head, or an ensemble cross-entropy
//! - Chamfer distance for generated completion clouds

mod cascade;
mod chamfer;

pub use cascade::{CascadeLoss, CascadeLossOutput};
pub use chamfer::{chamfer_distance, completion_loss, pairwise_sq_distances};
