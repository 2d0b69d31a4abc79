//! Overlay Presenter: the user-visible surface bound 1:1 to a live
//! session controller (spec.md §2.5), plus the `attach` command over
//! the registry's background/minimized lists (spec.md §6). Rendering
//! itself is an out-of-scope collaborator, defined here only as the
//! `TuiRenderer` trait this crate drives.

pub mod attach;
pub mod presenter;
pub mod renderer;

pub use attach::{attach, AttachOutcome};
pub use presenter::{OverlayPresenter, PresenterOutcome, SessionIdentity};
pub use renderer::{DetachDialogFrame, Frame, HeadlessRenderer, InputEvent, TuiRenderer};
