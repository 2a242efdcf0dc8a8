// Copyright 2024, The Android Open Source Project
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! X25519 scalar multiplication (RFC 7748).

/// The canonical Curve25519 base point u-coordinate.
pub const X25519_BASEPOINT: [u8; 32] = x25519_dalek::X25519_BASEPOINT_BYTES;

/// Computes `scalar * point` on the Montgomery curve. The scalar is clamped
/// per RFC 7748; the ladder is constant-time in the scalar.
pub fn x25519(scalar: [u8; 32], point: [u8; 32]) -> [u8; 32] {
    x25519_dalek::x25519(scalar, point)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc7748_test_vector() {
        let scalar: [u8; 32] = hex::decode(
            "a546e36bf0527c9d3b16154b82465edd62144c0ac1fc5a18506a2244ba449ac4",
        )
        .unwrap()
        .try_into()
        .unwrap();
        let point: [u8; 32] = hex::decode(
            "e6db6867583030db3594c1a424b15f7c726624ec26b3353b10a903a6d0ab1c4c",
        )
        .unwrap()
        .try_into()
        .unwrap();
        let expected: [u8; 32] = hex::decode(
            "c3da55379de9c6908e94ea4df28d084f32eccf03491c71f754b4075577a28552",
        )
        .unwrap()
        .try_into()
        .unwrap();
        assert_eq!(x25519(scalar, point), expected);
    }

    #[test]
    fn ladder_commutes() {
        let a = [0x0au8; 32];
        let b = [0x5cu8; 32];
        let a_then_b = x25519(b, x25519(a, X25519_BASEPOINT));
        let b_then_a = x25519(a, x25519(b, X25519_BASEPOINT));
        assert_eq!(a_then_b, b_then_a);
    }
}
