//! Host-side big integers for codegen-time precomputation.
//!
//! Montgomery constants (`R mod p`, `R² mod p`, `-1/p₀ mod 2^w`, `(p+1)/2`)
//! are computed here, on the host, and baked into the emitted module as
//! immutable globals. The word type is a parameter because descriptors may
//! use 32- or 64-bit limbs; everything is little-endian limb order.
//!
//! The modular routines double as the oracle for the executable tests, so
//! they favour obviously-correct shift-and-subtract forms over speed.

use std::fmt;

use crate::error::{Error, Result, };

/// Limb type for [`BigNum`]. Implemented for `u32` and `u64`.
pub trait Word: Copy + Eq + Ord + fmt::Debug + 'static {
  const BITS: u32;
  const ZERO: Self;
  const ONE: Self;

  fn from_u64(v: u64) -> Self;
  fn to_u64(self) -> u64;
  fn overflowing_add(self, rhs: Self) -> (Self, bool);
  fn overflowing_sub(self, rhs: Self) -> (Self, bool);
  fn wrapping_mul(self, rhs: Self) -> Self;
  fn wrapping_sub(self, rhs: Self) -> Self;
  fn leading_zeros(self) -> u32;
  fn shl1_carry(self, carry_in: bool) -> (Self, bool);
  fn shr1_fill(self, fill_in: bool) -> (Self, bool);
}

macro_rules! impl_word {
  ($t:ty) => {
    impl Word for $t {
      const BITS: u32 = <$t>::BITS;
      const ZERO: Self = 0;
      const ONE: Self = 1;

      fn from_u64(v: u64) -> Self { v as $t }
      fn to_u64(self) -> u64 { self as u64 }
      fn overflowing_add(self, rhs: Self) -> (Self, bool) { self.overflowing_add(rhs) }
      fn overflowing_sub(self, rhs: Self) -> (Self, bool) { self.overflowing_sub(rhs) }
      fn wrapping_mul(self, rhs: Self) -> Self { self.wrapping_mul(rhs) }
      fn wrapping_sub(self, rhs: Self) -> Self { self.wrapping_sub(rhs) }
      fn leading_zeros(self) -> u32 { self.leading_zeros() }
      fn shl1_carry(self, carry_in: bool) -> (Self, bool) {
        ((self << 1) | (carry_in as $t), self >> (<$t>::BITS - 1) != 0)
      }
      fn shr1_fill(self, fill_in: bool) -> (Self, bool) {
        ((self >> 1) | ((fill_in as $t) << (<$t>::BITS - 1)), self & 1 != 0)
      }
    }
  };
}
impl_word!(u32);
impl_word!(u64);

/// Dynamic-wordsize big integer, little-endian limbs.
///
/// `bits` is the declared width; all arithmetic keeps the limb count fixed
/// so values compose with a modulus of the same shape.
#[derive(Clone, Eq, PartialEq)]
pub struct BigNum<W: Word> {
  pub bits: u32,
  pub limbs: Vec<W>,
}

impl<W: Word> BigNum<W> {
  pub fn num_words(bits: u32) -> usize {
    ((bits + W::BITS - 1) / W::BITS) as usize
  }

  pub fn zero(bits: u32) -> Self {
    BigNum { bits, limbs: vec![W::ZERO; Self::num_words(bits)], }
  }

  pub fn one(bits: u32) -> Self {
    let mut n = Self::zero(bits);
    n.limbs[0] = W::ONE;
    n
  }

  pub fn from_limbs(bits: u32, limbs: &[W]) -> Self {
    assert_eq!(limbs.len(), Self::num_words(bits));
    BigNum { bits, limbs: limbs.to_vec(), }
  }

  /// Parse big-endian hex. An optional `0x` prefix is accepted; the value
  /// must fit the declared width, but the MSB position is not checked here
  /// (moduli get the strict check in `parse_modulus`).
  pub fn from_hex(hex: &str, bits: u32) -> Result<Self> {
    let hex = hex.strip_prefix("0x").unwrap_or(hex);
    if hex.is_empty() {
      return Err(Error::Configuration("empty hex literal".into()));
    }
    let mut n = Self::zero(bits);
    let nibbles_per_word = (W::BITS / 4) as usize;
    for (i, c) in hex.bytes().rev().enumerate() {
      let v = match c {
        b'0'..=b'9' => c - b'0',
        b'a'..=b'f' => c - b'a' + 10,
        b'A'..=b'F' => c - b'A' + 10,
        _ => {
          return Err(Error::Configuration(format!("invalid hex digit `{}`",
                                                  c as char)));
        },
      };
      if v == 0 { continue; }
      let word = i / nibbles_per_word;
      if word >= n.limbs.len() {
        return Err(Error::Configuration(format!("hex literal wider than {} bits",
                                                bits)));
      }
      let shift = (i % nibbles_per_word) as u32 * 4;
      let (limb, _) = n.limbs[word].overflowing_add(W::from_u64((v as u64) << shift));
      n.limbs[word] = limb;
    }
    if n.bit_len() > bits {
      return Err(Error::Configuration(format!("hex literal wider than {} bits",
                                              bits)));
    }
    Ok(n)
  }

  /// Parse a modulus: the most significant limb must use exactly the bits
  /// declared, i.e. the MSB sits at position `bits - 1`.
  pub fn parse_modulus(hex: &str, bits: u32) -> Result<Self> {
    let n = Self::from_hex(hex, bits)?;
    let actual = n.bit_len();
    if actual != bits {
      return Err(Error::Configuration(format!(
        "modulus MSB at bit {} but {} bits declared", actual, bits)));
    }
    Ok(n)
  }

  pub fn bit_len(&self) -> u32 {
    for (i, &l) in self.limbs.iter().enumerate().rev() {
      if l != W::ZERO {
        return i as u32 * W::BITS + (W::BITS - l.leading_zeros());
      }
    }
    0
  }

  pub fn is_zero(&self) -> bool {
    self.limbs.iter().all(|&l| l == W::ZERO)
  }

  pub fn is_odd(&self) -> bool {
    self.limbs[0].to_u64() & 1 == 1
  }

  pub fn bit(&self, i: u32) -> bool {
    let w = (i / W::BITS) as usize;
    w < self.limbs.len() && self.limbs[w].to_u64() >> (i % W::BITS) & 1 == 1
  }

  fn ge(&self, other: &Self) -> bool {
    debug_assert_eq!(self.limbs.len(), other.limbs.len());
    for i in (0..self.limbs.len()).rev() {
      if self.limbs[i] != other.limbs[i] {
        return self.limbs[i] > other.limbs[i];
      }
    }
    true
  }

  fn add_assign(&mut self, other: &Self) -> bool {
    let mut carry = false;
    for i in 0..self.limbs.len() {
      let (s1, c1) = self.limbs[i].overflowing_add(other.limbs[i]);
      let (s2, c2) = s1.overflowing_add(if carry { W::ONE } else { W::ZERO });
      self.limbs[i] = s2;
      carry = c1 | c2;
    }
    carry
  }

  fn sub_assign(&mut self, other: &Self) -> bool {
    let mut borrow = false;
    for i in 0..self.limbs.len() {
      let (d1, b1) = self.limbs[i].overflowing_sub(other.limbs[i]);
      let (d2, b2) = d1.overflowing_sub(if borrow { W::ONE } else { W::ZERO });
      self.limbs[i] = d2;
      borrow = b1 | b2;
    }
    borrow
  }

  fn shl1(&mut self) -> bool {
    let mut carry = false;
    for l in self.limbs.iter_mut() {
      let (v, c) = l.shl1_carry(carry);
      *l = v;
      carry = c;
    }
    carry
  }

  fn shr1(&mut self) {
    let mut fill = false;
    for l in self.limbs.iter_mut().rev() {
      let (v, f) = l.shr1_fill(fill);
      *l = v;
      fill = f;
    }
  }

  /// `2·self mod p`; `self` must be `< p`.
  pub fn double_mod(&mut self, p: &Self) {
    let carry = self.shl1();
    if carry || self.ge(p) {
      self.sub_assign(p);
    }
  }

  /// Canonicalize a value below `2p` into `[0, p)`.
  pub fn reduce_mod(&self, p: &Self) -> Self {
    let mut r = self.clone();
    while r.ge(p) {
      r.sub_assign(p);
    }
    r
  }

  /// `self + other mod p`; both operands `< p`.
  pub fn add_mod(&self, other: &Self, p: &Self) -> Self {
    let mut r = self.clone();
    let carry = r.add_assign(other);
    if carry || r.ge(p) {
      r.sub_assign(p);
    }
    r
  }

  /// `self - other mod p`; both operands `< p`.
  pub fn sub_mod(&self, other: &Self, p: &Self) -> Self {
    let mut r = self.clone();
    if r.sub_assign(other) {
      r.add_assign(p);
    }
    r
  }

  /// `self · other mod p` by binary double-and-add; both operands `< p`.
  pub fn mul_mod(&self, other: &Self, p: &Self) -> Self {
    let mut acc = Self::zero(self.bits);
    for i in (0..other.bit_len()).rev() {
      acc.double_mod(p);
      if other.bit(i) {
        acc = acc.add_mod(self, p);
      }
    }
    acc
  }

  /// `R mod p` with `R = 2^(numWords·w)`: one doubled `numWords·w` times.
  pub fn monty_one(p: &Self) -> Self {
    let mut r = Self::one(p.bits);
    for _ in 0..p.limbs.len() as u32 * W::BITS {
      r.double_mod(p);
    }
    r
  }

  /// `R² mod p`.
  pub fn monty_r2(p: &Self) -> Self {
    let mut r = Self::one(p.bits);
    for _ in 0..2 * p.limbs.len() as u32 * W::BITS {
      r.double_mod(p);
    }
    r
  }

  /// `(p+1)/2`, the halving constant for odd values. `p` must be odd.
  pub fn half_plus_one(p: &Self) -> Self {
    debug_assert!(p.is_odd());
    let mut r = p.clone();
    r.shr1();
    r.add_assign(&Self::one(p.bits));
    r
  }

  /// `-1/p₀ mod 2^w`, the Montgomery reduction constant for the least
  /// significant limb. `p₀` must be odd. Newton's iteration doubles the
  /// valid bit count each round; an odd word is its own inverse mod 8, so
  /// five rounds cover 96 bits.
  pub fn m0ninv(p0: W) -> W {
    debug_assert!(p0.to_u64() & 1 == 1);
    let mut x = p0;
    for _ in 0..5 {
      let two = W::from_u64(2);
      x = x.wrapping_mul(two.wrapping_sub(p0.wrapping_mul(x)));
    }
    W::ZERO.wrapping_sub(x)
  }

  /// Limbs as `u64` values (each below `2^w`), for IR constant building.
  pub fn limbs_u64(&self) -> Vec<u64> {
    self.limbs.iter().map(|l| l.to_u64()).collect()
  }
}

impl<W: Word> fmt::Debug for BigNum<W> {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "0x")?;
    let mut seen = false;
    for &l in self.limbs.iter().rev() {
      if seen {
        write!(f, "{:0>1$x}", l.to_u64(), (W::BITS / 4) as usize)?;
      } else if l != W::ZERO {
        write!(f, "{:x}", l.to_u64())?;
        seen = true;
      }
    }
    if !seen { write!(f, "0")?; }
    Ok(())
  }
}

/// Repack limbs of width `w` into 64-bit host words, the layout kernel
/// buffers use regardless of the field's limb width.
pub fn pack_words(limbs: &[u64], w: u32) -> Vec<u64> {
  match w {
    64 => limbs.to_vec(),
    32 => {
      let mut out = Vec::with_capacity((limbs.len() + 1) / 2);
      for pair in limbs.chunks(2) {
        let lo = pair[0];
        let hi = if pair.len() == 2 { pair[1] } else { 0 };
        out.push(lo | hi << 32);
      }
      out
    },
    _ => panic!("unsupported word size {}", w),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const BLS12_381_P: &str =
    "1A0111EA397FE69A4B1BA7B6434BACD764774B84F38512BF6730D2A0F6B0F624\
     1EABFFFEB153FFFFB9FEFFFFFFFFAAAB";
  const BN254_R: &str =
    "30644E72E131A029B85045B68181585D2833E84879B9709143E1F593F0000001";
  const SECP256K1_P: &str =
    "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFEFFFFFC2F";

  #[test]
  fn parse_round_trip() {
    let p = BigNum::<u64>::parse_modulus(BLS12_381_P, 381).unwrap();
    assert_eq!(p.bit_len(), 381);
    assert_eq!(p.limbs.len(), 6);
    assert_eq!(p.limbs[0], 0xB9FE_FFFF_FFFF_AAAB);
    assert_eq!(p.limbs[5], 0x1A01_11EA_397F_E69A);
    assert!(p.is_odd());
  }

  #[test]
  fn modulus_msb_must_match_declared_bits() {
    // 381-bit value declared as 380 bits: reject.
    assert!(BigNum::<u64>::parse_modulus(BLS12_381_P, 380).is_err());
    // ... and declared too wide is also a mismatch.
    assert!(BigNum::<u64>::parse_modulus(BLS12_381_P, 384).is_err());
  }

  #[test]
  fn u32_limbs_agree_with_u64() {
    let p64 = BigNum::<u64>::parse_modulus(SECP256K1_P, 256).unwrap();
    let p32 = BigNum::<u32>::parse_modulus(SECP256K1_P, 256).unwrap();
    let packed = pack_words(&p32.limbs_u64(), 32);
    assert_eq!(packed, p64.limbs_u64());
  }

  #[test]
  fn add_sub_mod() {
    let p = BigNum::<u64>::parse_modulus(BLS12_381_P, 381).unwrap();
    let one = BigNum::one(381);
    let pm1 = p.sub_mod(&one, &p);
    // (p-1) + 1 = 0 mod p
    assert!(pm1.add_mod(&one, &p).is_zero());
    // 0 - 1 = p - 1 mod p
    let z = BigNum::zero(381);
    assert_eq!(z.sub_mod(&one, &p), pm1);
  }

  #[test]
  fn mul_mod_small() {
    let p = BigNum::<u64>::parse_modulus(SECP256K1_P, 256).unwrap();
    let a = BigNum::from_hex("10000000000000000", 256).unwrap(); // 2^64
    let b = BigNum::from_hex("2", 256).unwrap();
    let r = a.mul_mod(&b, &p);
    assert_eq!(r, BigNum::from_hex("20000000000000000", 256).unwrap());
  }

  #[test]
  fn secp256k1_monty_one() {
    // R = 2^256, p = 2^256 - 2^32 - 977, so R mod p = 2^32 + 977.
    let p = BigNum::<u64>::parse_modulus(SECP256K1_P, 256).unwrap();
    let one = BigNum::monty_one(&p);
    assert_eq!(one, BigNum::from_hex("1000003D1", 256).unwrap());
    // R² mod p must equal monty_one squared.
    let r2 = BigNum::monty_r2(&p);
    assert_eq!(r2, one.mul_mod(&one, &p));
  }

  #[test]
  fn bn254_m0ninv() {
    // Known reduction constant for the BN254 scalar field.
    let r = BigNum::<u64>::parse_modulus(BN254_R, 254).unwrap();
    let m0 = BigNum::m0ninv(r.limbs[0]);
    // -1/p0 * p0 = -1 mod 2^64
    assert_eq!(m0.wrapping_mul(r.limbs[0]), u64::MAX);
    assert_eq!(m0, 0xC2E1_F593_EFFF_FFFF);
  }

  #[test]
  fn m0ninv_u32() {
    let p0: u32 = 0xFFFF_FC2F; // secp256k1 low limb
    let m0 = BigNum::m0ninv(p0);
    assert_eq!(m0.wrapping_mul(p0), u32::MAX);
  }

  #[test]
  fn half_plus_one_halves_odd_values() {
    let p = BigNum::<u64>::parse_modulus(BN254_R, 254).unwrap();
    let h = BigNum::half_plus_one(&p);
    // 2 · (p+1)/2 = 1 mod p
    let two = BigNum::from_hex("2", 254).unwrap();
    assert_eq!(h.mul_mod(&two, &p), BigNum::one(254));
    // and 3/2 · 2 = 3
    let three = BigNum::from_hex("3", 254).unwrap();
    let half3 = three.mul_mod(&h, &p);
    assert_eq!(half3.mul_mod(&two, &p), three);
  }

  #[test]
  fn monty_round_trip() {
    let p = BigNum::<u64>::parse_modulus(BLS12_381_P, 381).unwrap();
    let r = BigNum::monty_one(&p);
    let r2 = BigNum::monty_r2(&p);
    // R·R mod p computed two ways.
    assert_eq!(r.mul_mod(&r, &p), r2);
  }
}
