mod backbone;
mod cb;
mod conv;
mod dfl;
mod downsample;
mod elan;
mod merge;
mod proto;
mod repconv;
mod sppelan;
mod upsample;

pub use backbone::CSPBackbone;
pub use cb::{CBFuse, CBLinear};
pub use conv::{Conv, ConvBn};
pub use dfl::DFL;
pub use downsample::{AConv, ADown};
pub use elan::{RepNCSPELAN4, ELAN1};
pub use merge::{Concat, Shortcut, Silence};
pub use proto::{Proto, UConv};
pub use repconv::{RepConvN, RepNBottleneck, RepNCSP};
pub use sppelan::SPPELAN;
pub use upsample::{resize_nearest, upsample_nearest, Upsample2d};
