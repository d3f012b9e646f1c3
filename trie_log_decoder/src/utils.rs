//! Small helpers that don't fit well into any other module.

use std::ops::BitAnd;

use num_traits::PrimInt;

pub(crate) fn is_even<T: PrimInt + BitAnd<Output = T>>(num: T) -> bool {
    (num & T::one()) == T::zero()
}
