// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Understory Damage: frame-to-frame damage tracking for retained layer trees.
//!
//! A compositor that repaints only what changed needs to know which part of the
//! screen differs from the frame already in the render target. This crate
//! computes that area by comparing two records of what each frame painted:
//!
//! - **Contributions** ([`Contribution`]): one per visible layer, holding its
//!   screen bounds, the layer, a [`Comparator`] for content equality, and the
//!   active [`MutatorChain`] (clips, opacity, filters, blending).
//! - **Snapshots** ([`FrameSnapshot`]): the contributions of a finished frame in
//!   paint order, indexed by cross-frame identity.
//! - **Damage context** ([`DamageContext`]): collects contributions during a
//!   traversal, diffs them against the previous snapshot, and produces a
//!   [`DamageArea`].
//! - **Delegates** ([`DamageDelegate`]): layers whose damage depends on damage
//!   elsewhere (backdrop filters) observe every damage event and may add damage
//!   of their own until the result stabilizes. [`ReadbackDelegate`] and
//!   [`ReadbackCache`] implement the common backdrop-sampling case.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::rc::Rc;
//! use kurbo::{Affine, Rect, Size};
//! use understory_damage::{ClipContext, Comparator, DamageContext, Layer, LayerKind};
//!
//! struct Solid {
//!     bounds: Rect,
//!     rgba: u32,
//! }
//!
//! impl Layer for Solid {
//!     fn paint_bounds(&self) -> Rect {
//!         self.bounds
//!     }
//! }
//!
//! const SOLID: Comparator<Solid> =
//!     Comparator::new(LayerKind::new(0), |a, b| a.rgba == b.rgba);
//!
//! let size = Size::new(640.0, 480.0);
//! let clip = ClipContext::new(Rect::from_origin_size((0.0, 0.0), size));
//! let mut ctx = DamageContext::new();
//!
//! let a = Rc::new(Solid { bounds: Rect::new(0.0, 0.0, 100.0, 100.0), rgba: 0xff0000ff });
//! let b = Rc::new(Solid { bounds: Rect::new(50.0, 50.0, 150.0, 150.0), rgba: 0x00ff00ff });
//!
//! ctx.init_frame(size, None);
//! ctx.add_contribution(&a, SOLID, Affine::IDENTITY, &clip);
//! ctx.add_contribution(&b, SOLID, Affine::IDENTITY, &clip);
//! let first = ctx.finish_frame();
//!
//! // Swapping overlapping layers damages both.
//! ctx.init_frame(size, Some(first.snapshot));
//! ctx.add_contribution(&b, SOLID, Affine::IDENTITY, &clip);
//! ctx.add_contribution(&a, SOLID, Affine::IDENTITY, &clip);
//! let second = ctx.finish_frame();
//! assert_eq!(second.area.bounds(), Rect::new(0.0, 0.0, 150.0, 150.0));
//! ```
//!
//! ## Identity
//!
//! Two contributions from different frames are the same logical unit when their
//! comparators have the same [`LayerKind`], their screen bounds are bitwise
//! equal, their mutator chains are equal, and their layers are either the same
//! object or compare equal through the comparator. Anything else is a removal
//! plus an addition. Transforms are folded into the bounds and are not part of
//! the chain.
//!
//! ## Delegate Negotiation
//!
//! After the diff, registered delegates are asked for additional damage until
//! none of them changes its answer. The loop is bounded by a
//! [`ConvergenceLimit`]; when the limit is hit the whole canvas is damaged and
//! [`Convergence::Exhausted`] is reported. See
//! [the contract](DamageDelegate#convergence-contract) delegates must follow.
//!
//! ## Tracing
//!
//! Diagnostic events are emitted through [`tracing`] under the
//! `understory_damage` target. For a structured record of why a frame is
//! damaged, use [`DamageContext::finish_frame_traced`] with a [`DamageTrace`]
//! sink such as [`trace::EventRecorder`].
//!
//! ## `no_std` Support
//!
//! This crate is `no_std` and uses `alloc`. Enable the `libm` feature instead of
//! the default `std` feature for targets without a floating-point runtime.
//!
//! Layers and delegates are shared through [`Rc`](alloc::rc::Rc); a context is
//! meant to live on the thread that renders the tree.

#![no_std]

extern crate alloc;

mod area;
mod context;
mod contribution;
mod delegate;
mod mutator;
mod readback;
mod snapshot;
pub mod trace;
mod util;

pub use area::DamageArea;
pub use context::{
    ClipContext, ContributionHandle, Convergence, ConvergenceLimit, DEFAULT_MAX_ROUNDS,
    DamageContext, DamageResult, SingularTransformError,
};
pub use contribution::{Comparator, Contribution, Layer, LayerKind};
pub use delegate::{DamageDelegate, DamageSource};
pub use mutator::{Mutator, MutatorChain};
pub use readback::{ReadbackCache, ReadbackDelegate};
pub use snapshot::FrameSnapshot;
pub use trace::{DamageCause, DamageEvent, DamageTrace};
