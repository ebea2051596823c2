pub use crate::{
    blocklist::*, errors::*, math::*, node::*, number::*, scalar::*, tape::*,
};
