//! Hierarchical key derivation
//!
//! HMAC-SHA512 based master/child derivation over secp256k1 and the
//! fixed path mapping a mnemonic seed to the wallet's signing key.

use bip39::{Language, Mnemonic};
use crypto_bigint::{Encoding, U256};
use secp256k1::SecretKey;
use thiserror::Error;
use zeroize::Zeroize;

use super::hash::hmac_sha512;
use super::keys::{PrivateKey, PublicKey, SCALAR_SIZE};

/// HMAC key used to derive the master key from a seed
pub const MASTER_KEY_SALT: &[u8] = b"Bitcoin seed";

/// Indices at or above this value are hardened
pub const HARDENED_OFFSET: u32 = 0x8000_0000;

/// `m/44'/3077'/0'/0/0`
pub const COS_DERIVATION_PATH: [u32; 5] = [
    HARDENED_OFFSET + 44,
    HARDENED_OFFSET + 3077,
    HARDENED_OFFSET,
    0,
    0,
];

// secp256k1 group order
const CURVE_ORDER: U256 =
    U256::from_be_hex("fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364141");

/// Derivation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DerivationError {
    #[error("Seed does not yield a valid master key")]
    InvalidMasterKey,
    #[error("Child key at index {0:#x} is invalid")]
    InvalidChildKey(u32),
    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),
}

/// A private key extended with its chain code
#[derive(Clone)]
pub struct ExtendedKey {
    private_key: PrivateKey,
    chain_code: [u8; 32],
    public_key: PublicKey,
}

impl ExtendedKey {
    fn from_parts(private_key: PrivateKey, chain_code: [u8; 32]) -> Self {
        let public_key = private_key.public_key();
        Self {
            private_key,
            chain_code,
            public_key,
        }
    }

    /// Derive the master key: `HMAC-SHA512("Bitcoin seed", seed)`
    pub fn master(seed: &[u8]) -> Result<Self, DerivationError> {
        let mut digest = hmac_sha512(MASTER_KEY_SALT, seed);
        let (left, right) = digest.split_at(SCALAR_SIZE);

        let secret_key = SecretKey::from_slice(left).map_err(|_| DerivationError::InvalidMasterKey);
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(right);
        digest.zeroize();

        Ok(Self::from_parts(
            PrivateKey::from_secret_key(secret_key?),
            chain_code,
        ))
    }

    /// Derive the child at `index` as `(IL + parent) mod N`.
    ///
    /// A tweak at or above `N` is reduced rather than rejected. Fails, without
    /// skipping to `index + 1`, only when the child scalar is zero.
    pub fn derive(&self, index: u32) -> Result<Self, DerivationError> {
        let mut data = [0u8; 37];
        if index >= HARDENED_OFFSET {
            data[1..33].copy_from_slice(&self.private_key.to_bytes());
        } else {
            data[..33].copy_from_slice(&self.public_key.to_bytes());
        }
        data[33..].copy_from_slice(&index.to_be_bytes());

        let mut digest = hmac_sha512(&self.chain_code, &data);
        data.zeroize();

        let mut tweak_bytes = [0u8; SCALAR_SIZE];
        tweak_bytes.copy_from_slice(&digest[..SCALAR_SIZE]);
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&digest[SCALAR_SIZE..]);
        digest.zeroize();

        let mut parent = self.private_key.to_bytes();
        let child = add_mod_order(&tweak_bytes, &parent);
        tweak_bytes.zeroize();
        parent.zeroize();

        let mut child = child.ok_or(DerivationError::InvalidChildKey(index))?;
        let private_key =
            PrivateKey::from_bytes(&child).map_err(|_| DerivationError::InvalidChildKey(index));
        child.zeroize();
        Ok(Self::from_parts(private_key?, chain_code))
    }

    /// Derive along every index of `path` in order
    pub fn derive_path(&self, path: &[u32]) -> Result<Self, DerivationError> {
        path.iter()
            .try_fold(self.clone(), |key, index| key.derive(*index))
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn chain_code(&self) -> &[u8; 32] {
        &self.chain_code
    }
}

impl Drop for ExtendedKey {
    fn drop(&mut self) {
        self.chain_code.zeroize();
    }
}

/// `(tweak + parent) mod N`, or `None` when the sum is zero
fn add_mod_order(
    tweak: &[u8; SCALAR_SIZE],
    parent: &[u8; SCALAR_SIZE],
) -> Option<[u8; SCALAR_SIZE]> {
    let mut tweak = U256::from_be_slice(tweak).wrapping_rem(&CURVE_ORDER);
    let mut parent = U256::from_be_slice(parent);
    let mut sum = tweak.add_mod(&parent, &CURVE_ORDER);

    let child = if sum == U256::ZERO {
        None
    } else {
        Some(sum.to_be_bytes())
    };
    tweak.zeroize();
    parent.zeroize();
    sum.zeroize();
    child
}

/// Master key of `seed`
pub fn derive_master_key(seed: &[u8]) -> Result<ExtendedKey, DerivationError> {
    ExtendedKey::master(seed)
}

/// Child of `key` at `index`
pub fn derive(key: &ExtendedKey, index: u32) -> Result<ExtendedKey, DerivationError> {
    key.derive(index)
}

/// The wallet signing key for a BIP39 seed
pub fn private_key_from_seed(seed: &[u8]) -> Result<PrivateKey, DerivationError> {
    let key = ExtendedKey::master(seed)?.derive_path(&COS_DERIVATION_PATH)?;
    Ok(key.private_key().clone())
}

/// The wallet signing key for an English BIP39 mnemonic (empty passphrase)
pub fn private_key_from_mnemonic(mnemonic: &str) -> Result<PrivateKey, DerivationError> {
    let normalized = mnemonic.split_whitespace().collect::<Vec<_>>().join(" ");
    let mnemonic = Mnemonic::parse_in_normalized(Language::English, &normalized)
        .map_err(|e| DerivationError::InvalidMnemonic(e.to_string()))?;

    let mut seed = mnemonic.to_seed_normalized("");
    let key = private_key_from_seed(&seed);
    seed.zeroize();
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::wif::{private_key_to_wif, public_key_to_wif};

    // (mnemonic, private key hex, compressed public key hex)
    const VECTORS: [(&str, &str, &str); 4] = [
        (
            "dance bleak matter hurt mule prefer casual mad actress tragic click badge involve suspect close wink fortune base genuine record burst order awkward west",
            "b9fb9b10108887758eabf64c472c14595fe96eed922dfe1067050227b1e04536",
            "024dc6da0c5cc8ac2e4156eda82dc3bff44bed7efd723dd5058e5cb8e6b091c0ec",
        ),
        (
            "trial meadow film under spot flower color lift dance switch verify defy cram coil injury grit ancient allow promote catalog once response clean fold",
            "ac943d9aae23a8fe0cc472536de04ea64e4e3fee2c78ad73ec79cfe30befa231",
            "0223398cb1e70f043305745a516c5eb3b71e9897c41ad321776173f39b48587808",
        ),
        (
            "syrup ice one bag obscure will syrup deliver payment ability grain half never often fan gun caught noodle urge begin bronze canal enact awake",
            "21504eff9d1135ca26f9dc4f890677dad9618e3071de7550e82aecb896e88116",
            "02a04b2ecf1cad95361dc6468194e48fd9227eea8e262e744ab9c4c4adb7fc94f6",
        ),
        (
            "like pigeon deputy ceiling edit alcohol bench move welcome waste filter hood soft quit draw educate jewel arch scheme point always bachelor attend fever",
            "14b629d86bed1c5167218af99f1714a44f0c139f3f7d1063e32d3f1a3fce41dd",
            "02b58b3454ff623ccafe50b9cd8316cb5b242c61c975f9dca15d4d079e33fb93d0",
        ),
    ];

    // (mnemonic, public key WIF, private key WIF)
    const WIF_VECTORS: [(&str, &str, &str); 10] = [
        (
            "dance bleak matter hurt mule prefer casual mad actress tragic click badge involve suspect close wink fortune base genuine record burst order awkward west",
            "COS5Uk4F1bk91EKSN4NkS2fokDi1SQ8uin5bbwycSPHw4aCopLZNX",
            "4MernMvhJ4YJ3JeQ4rtmKBpnjwC8xG9mAim9TwMnofL9hBEPvc",
        ),
        (
            "trial meadow film under spot flower color lift dance switch verify defy cram coil injury grit ancient allow promote catalog once response clean fold",
            "COS5A189FNRm8u1VqDEZZAFUwdEnNZqVfh4DK8DiTAKSpcy8SUNYF",
            "4FkUfdk3fM3fBsxSdfZ1WjbnhvnMoeJKHFK3EnCweDygsmmDrp",
        ),
        (
            "flavor identify people cup squirrel sad ostrich common inch toast paddle purse bid ceiling stem clay three pudding arctic wing thrive approve memory lumber",
            "COS7SC6RkXvvcQ2KgJPigm4oZYEGW6qN6QpRpiHC3uyiwdirWHgY4",
            "4CH5U9Q4xsbnNC8sdTCv4pcu1r8fHGVWdNwN5H86WpgXfsw3cW",
        ),
        (
            "scatter pole curve maximum harsh praise alien lamp cook target dust improve giggle buffalo disease motion what relief bulb pool kit mandate mixed damage",
            "COS6YSaPYX8krmC3FexdcgULNrKJQ69uttUz7SXBXSzBqf3HE6nSC",
            "4gsGAGL7A3wtys7kwbgnDjqEgTqPk3KcEJLAKhdHjVxgyp2eks",
        ),
        (
            "around lecture mystery key retire audit combine episode guard bamboo solid mosquito combine mango clay foot prepare flip safe gas misery fever scissors industry",
            "COS7FmWmosEoEWosj9bi7E28fRoWTsz8v282HAMRG191QKtTp9mPq",
            "4YAgTcBY59Bq6eEpZyh3ZNnfWGaYUEdPtCSjkkmRiJyj7uNVzt",
        ),
        (
            "syrup ice one bag obscure will syrup deliver payment ability grain half never often fan gun caught noodle urge begin bronze canal enact awake",
            "COS675qi9hUyvHSzPSPKjoZZa64dBPrzoxjiN3YEnMU3WUgrTYtJg",
            "3CR8ZM4BEPvtJdqLXwysL1ewPigbbQdo1d7ykMPAMFPmi7wn6X",
        ),
        (
            "wool brain base sad sphere garbage end practice master tooth budget expect plate dust music fine crane bird exile leave isolate select walnut story",
            "COS6SNiqWthVdpRaYK5Exu7D4xy6GrYPD2bmKKWPoWd2GFdokefob",
            "3WQxqvU1xAhAHEAwzkZYLnL9xCjniy8JNxashJYfPkh7uzEaep",
        ),
        (
            "butter ticket stadium sunny arrange emotion rib gadget slush fortune crawl spell win fix either blood script amazing west lazy present best agree stereo",
            "COS7ue9V6B27RGyGeoiNZBmWkXveqAeqnibUASNGmBG47oyBfamYr",
            "4Wk27auR5sGBiRh9F3a9D4HnympCpzJfjxtYC2dxiMs2PSxNQx",
        ),
        (
            "lecture skin empower license winner sadness mass hockey sibling shop student joke calm picnic smooth simple humor doctor can road toilet prefer verify column",
            "COS74PkwHVxrDYLLwKGjKc7zSguFJVcp4G9o1QgY3rWL8CJ3R2tsb",
            "2z8tRpTc4F8o8DvKckhzJJAqsicoAvCLu3PB5XQg2izL8Tbn5g",
        ),
        (
            "like pigeon deputy ceiling edit alcohol bench move welcome waste filter hood soft quit draw educate jewel arch scheme point always bachelor attend fever",
            "COS6GSePms9tpFEgcJCrR4uqKhXbuw7mioRvSKYHhtXWNy7CqXVKB",
            "36sE6fmfGooXqpNxQcNNyP5innMs1aZhJEPxmGrntJWtaNBaU1",
        ),
    ];

    fn scalar(hex_str: &str) -> [u8; SCALAR_SIZE] {
        let mut out = [0u8; SCALAR_SIZE];
        out.copy_from_slice(&hex::decode(hex_str).unwrap());
        out
    }

    #[test]
    fn test_mnemonic_wif_vectors() {
        for (mnemonic, public_wif, private_wif) in WIF_VECTORS {
            let key = private_key_from_mnemonic(mnemonic).unwrap();
            assert_eq!(private_key_to_wif(&key), private_wif);
            assert_eq!(public_key_to_wif(&key.public_key()), public_wif);
        }
    }

    #[test]
    fn test_curve_order_constant() {
        assert_eq!(CURVE_ORDER.to_be_bytes(), secp256k1::constants::CURVE_ORDER);
    }

    #[test]
    fn test_child_scalar_reduced_mod_order() {
        let n = secp256k1::constants::CURVE_ORDER;
        let n_minus_one = scalar("fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364140");
        let mut one = [0u8; SCALAR_SIZE];
        one[31] = 1;
        let mut two = [0u8; SCALAR_SIZE];
        two[31] = 2;

        // a tweak equal to N acts as zero
        assert_eq!(add_mod_order(&n, &two), Some(two));
        // a tweak above N is reduced first
        assert_eq!(
            add_mod_order(&[0xff; SCALAR_SIZE], &one),
            Some(scalar("000000000000000000000000000000014551231950b75fc4402da1732fc9bebf"))
        );
        // wraps past N
        assert_eq!(add_mod_order(&n_minus_one, &two), Some(one));
        // only a zero child is invalid
        assert_eq!(add_mod_order(&n_minus_one, &one), None);
    }

    #[test]
    fn test_mnemonic_vectors() {
        for (mnemonic, private_hex, public_hex) in VECTORS {
            let key = private_key_from_mnemonic(mnemonic).unwrap();
            assert_eq!(hex::encode(key.to_bytes()), private_hex);
            assert_eq!(key.public_key().to_hex(), public_hex);
        }
    }

    #[test]
    fn test_mnemonic_whitespace_is_normalized() {
        let (mnemonic, private_hex, _) = VECTORS[0];
        let spaced = format!("  {}\n", mnemonic.replace(' ', "   "));
        let key = private_key_from_mnemonic(&spaced).unwrap();
        assert_eq!(hex::encode(key.to_bytes()), private_hex);
    }

    #[test]
    fn test_invalid_mnemonic_rejected() {
        assert!(matches!(
            private_key_from_mnemonic("not a real mnemonic phrase"),
            Err(DerivationError::InvalidMnemonic(_))
        ));
    }

    #[test]
    fn test_bip32_vector_1_master_and_hardened_child() {
        // BIP32 test vector 1
        let seed = hex::decode("000102030405060708090a0b0c0d0e0f").unwrap();
        let master = derive_master_key(&seed).unwrap();
        assert_eq!(
            hex::encode(master.private_key().to_bytes()),
            "e8f32e723decf4051aefac8e2c93c9c5b214313817cdb01a1494b917c8436b35"
        );
        assert_eq!(
            hex::encode(master.chain_code()),
            "873dff81c02f525623fd1fe5167eac3a55a049de3d314bb42ee227ffed37d508"
        );

        let child = derive(&master, HARDENED_OFFSET).unwrap();
        assert_eq!(
            hex::encode(child.private_key().to_bytes()),
            "edb2e14f9ee77d26dd93b4ecede8d16ed408ce149b6cd80b0715a2d911a0afea"
        );
        assert_eq!(
            hex::encode(child.chain_code()),
            "47fdacbd0f1097043b78c63c20c34ef4ed9a111d980047ad16282c7ae6236141"
        );

        // m/0'/1 exercises the non-hardened branch
        let grandchild = child.derive(1).unwrap();
        assert_eq!(
            hex::encode(grandchild.private_key().to_bytes()),
            "3c6cb8d0f6a264c91ea8b5030fadaa8e538b020f0a387421a12de9319dc93368"
        );
    }

    #[test]
    fn test_derive_path_matches_stepwise() {
        let master = derive_master_key(b"some seed bytes for derivation").unwrap();
        let stepwise = COS_DERIVATION_PATH
            .iter()
            .fold(master.clone(), |key, index| key.derive(*index).unwrap());
        let direct = master.derive_path(&COS_DERIVATION_PATH).unwrap();
        assert_eq!(direct.private_key(), stepwise.private_key());
        assert_eq!(direct.public_key(), stepwise.public_key());
    }

    #[test]
    fn test_hardened_and_normal_children_differ() {
        let master = derive_master_key(b"another seed").unwrap();
        let normal = master.derive(7).unwrap();
        let hardened = master.derive(HARDENED_OFFSET + 7).unwrap();
        assert_ne!(normal.private_key(), hardened.private_key());
    }
}
