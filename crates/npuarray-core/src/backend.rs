//! Backend trait that combines all operations

use crate::array::Array;
use crate::ops::*;

/// A complete backend implementation
///
/// Backends implement the individual operation traits over one array type
/// and one context type.
pub trait Backend:
    CreationOps
    + MathOps<Array = <Self as CreationOps>::Array>
    + CompareOps
    + StatsOps<Array = <Self as CreationOps>::Array>
    + LinalgOps<Array = <Self as CreationOps>::Array>
    + RandomOps<
        Array = <Self as CreationOps>::Array,
        Context = <Self as CreationOps>::Context,
    >
where
    <Self as CreationOps>::Array: Array,
{
    /// Backend name for identification
    fn name() -> &'static str;

    /// Backend version
    fn version() -> &'static str;

    /// Number of devices the backend can address
    fn device_count(ctx: &<Self as CreationOps>::Context) -> u32;
}
