use num_traits::PrimInt;

/// Sign-extends an 8-bit immediate to a word.
#[inline(always)]
pub const fn extend_sign(value: u8) -> u16 {
    value as i8 as i16 as u16
}

/// Even parity of the low byte, which is all PF ever looks at.
#[inline(always)]
pub const fn parity(value: u16) -> bool {
    (value as u8).count_ones() & 1 == 0
}

/// Fixed-width arithmetic that reports overflow and carry the way the
/// FLAGS register sees them.
pub trait SpecialOps: PrimInt {
    /// `self + y + carry` as (result, signed overflow, unsigned carry).
    fn oc_carry_add(self, y: Self, carry: bool) -> (Self, bool, bool);
    /// `self - y - borrow` as (result, signed overflow, unsigned borrow).
    fn oc_carry_sub(self, y: Self, borrow: bool) -> (Self, bool, bool);

    #[inline]
    fn oc_add(self, y: Self) -> (Self, bool, bool) {
        self.oc_carry_add(y, false)
    }

    #[inline]
    fn oc_sub(self, y: Self) -> (Self, bool, bool) {
        self.oc_carry_sub(y, false)
    }

    /// Rotate through carry: the value and CF form one `BITS + 1` wide ring.
    fn rotate_carry_left(self, count: u32, carry: bool) -> (Self, bool);
    fn rotate_carry_right(self, count: u32, carry: bool) -> (Self, bool);

    #[inline]
    fn msb(self) -> bool {
        self.leading_zeros() == 0
    }
}

macro_rules! special_uint_impl {
    (
        Self = $SelfT:ty,
        SignedT = $SignedT:ident,
    ) => {
        impl SpecialOps for $SelfT {
            #[inline]
            fn oc_carry_add(self, y: Self, carry: bool) -> (Self, bool, bool) {
                let (partial, c1) = self.overflowing_add(y);
                let (res, c2) = partial.overflowing_add(carry as $SelfT);
                let wide = (self as $SignedT as i32) + (y as $SignedT as i32) + (carry as i32);
                let overflow = wide < ($SignedT::MIN as i32) || wide > ($SignedT::MAX as i32);
                (res, overflow, c1 || c2)
            }

            #[inline]
            fn oc_carry_sub(self, y: Self, borrow: bool) -> (Self, bool, bool) {
                let (partial, c1) = self.overflowing_sub(y);
                let (res, c2) = partial.overflowing_sub(borrow as $SelfT);
                let wide = (self as $SignedT as i32) - (y as $SignedT as i32) - (borrow as i32);
                let overflow = wide < ($SignedT::MIN as i32) || wide > ($SignedT::MAX as i32);
                (res, overflow, c1 || c2)
            }

            fn rotate_carry_left(self, count: u32, carry: bool) -> (Self, bool) {
                let bits = Self::BITS + 1;
                let count = count % bits;
                if count == 0 {
                    return (self, carry);
                }
                let wide = ((carry as u32) << Self::BITS) | (self as u32);
                let rotated = ((wide << count) | (wide >> (bits - count))) & ((1u32 << bits) - 1);
                (rotated as $SelfT, (rotated >> Self::BITS) & 1 != 0)
            }

            fn rotate_carry_right(self, count: u32, carry: bool) -> (Self, bool) {
                let bits = Self::BITS + 1;
                let count = count % bits;
                if count == 0 {
                    return (self, carry);
                }
                let wide = ((carry as u32) << Self::BITS) | (self as u32);
                let rotated = ((wide >> count) | (wide << (bits - count))) & ((1u32 << bits) - 1);
                (rotated as $SelfT, (rotated >> Self::BITS) & 1 != 0)
            }
        }
    };
}

special_uint_impl! {
    Self = u8,
    SignedT = i8,
}

special_uint_impl! {
    Self = u16,
    SignedT = i16,
}
