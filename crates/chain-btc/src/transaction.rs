use bitcoin::absolute::LockTime;
use bitcoin::hashes::Hash;
use bitcoin::script::{PushBytesBuf, ScriptBuf};
use bitcoin::secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::Version;
use bitcoin::{ecdsa, Amount, OutPoint, Sequence, Transaction, TxIn, TxOut, Txid, Witness};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::address::{hash160, p2sh_p2wpkh_redeem_script, AddressGenerator};
use crate::error::BtcError;
use crate::network::BtcNetwork;
use crate::utxo::{SelectionStrategy, Utxo, UtxoSelector, DEFAULT_MAX_BNB_ITERATIONS};

/// Input sequence: final for relative lock-time, lock-time enabled.
pub const INPUT_SEQUENCE: Sequence = Sequence::ENABLE_LOCKTIME_NO_RBF;

/// Everything needed to build one payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    /// UTXOs owned by `from`, the candidates for selection.
    pub utxos: Vec<Utxo>,
    /// Sender address; its type drives fee estimation.
    pub from: String,
    pub to: String,
    pub amount_sat: u64,
    /// Fee rate in sat/vB.
    pub fee_rate: u64,
    /// Defaults to `from`.
    #[serde(default)]
    pub change_address: Option<String>,
    #[serde(default)]
    pub strategy: SelectionStrategy,
}

/// An unsigned Bitcoin transaction ready for signing.
#[derive(Debug, Clone)]
pub struct UnsignedTransaction {
    /// The transaction with empty scriptSigs and witnesses.
    pub tx: Transaction,
    /// The outputs being spent, in input order. Needed for sighashes.
    pub prevouts: Vec<TxOut>,
    pub fee_sat: u64,
    /// Zero when no change output was emitted.
    pub change_sat: u64,
}

/// Builds unsigned payment transactions for one network.
#[derive(Debug, Clone, Copy)]
pub struct TransactionBuilder {
    generator: AddressGenerator,
    max_iterations: usize,
}

impl TransactionBuilder {
    pub fn new(network: BtcNetwork) -> Self {
        Self {
            generator: AddressGenerator::new(network),
            max_iterations: DEFAULT_MAX_BNB_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn network(&self) -> BtcNetwork {
        self.generator.network()
    }

    /// Select inputs for `request` and assemble the unsigned transaction.
    ///
    /// Outputs are the payment followed by change, the latter only when
    /// `total - amount - fee` is non-zero.
    pub fn build(&self, request: &TransactionRequest) -> Result<UnsignedTransaction, BtcError> {
        let change_address = request.change_address.as_deref().unwrap_or(&request.from);

        self.generator.script_pubkey(&request.from)?;
        let payment_script = self.generator.script_pubkey(&request.to)?;
        let change_script = self.generator.script_pubkey(change_address)?;

        if request.amount_sat == 0 {
            return Err(BtcError::TransactionBuildFailed(
                "amount must be greater than zero".into(),
            ));
        }

        let sender_type = self.generator.address_type(&request.from).ok_or_else(|| {
            BtcError::UnsupportedScriptType(format!("cannot spend from {}", request.from))
        })?;

        let selection = UtxoSelector::new(sender_type)
            .with_max_iterations(self.max_iterations)
            .select(
                &request.utxos,
                request.amount_sat,
                request.fee_rate,
                request.strategy,
            )?;

        let change_sat = selection
            .total_sat
            .checked_sub(request.amount_sat)
            .and_then(|rest| rest.checked_sub(selection.fee_sat))
            .ok_or_else(|| {
                BtcError::TransactionBuildFailed("selection does not cover amount and fee".into())
            })?;

        let mut inputs = Vec::with_capacity(selection.selected.len());
        let mut prevouts = Vec::with_capacity(selection.selected.len());
        for utxo in &selection.selected {
            let txid: Txid = utxo.txid.parse().map_err(|e| {
                BtcError::TransactionBuildFailed(format!("invalid txid {}: {e}", utxo.txid))
            })?;

            inputs.push(TxIn {
                previous_output: OutPoint::new(txid, utxo.vout),
                script_sig: ScriptBuf::new(),
                sequence: INPUT_SEQUENCE,
                witness: Witness::default(),
            });
            prevouts.push(TxOut {
                value: Amount::from_sat(utxo.amount_sat),
                script_pubkey: ScriptBuf::from(utxo.script_pubkey.clone()),
            });
        }

        let mut outputs = vec![TxOut {
            value: Amount::from_sat(request.amount_sat),
            script_pubkey: ScriptBuf::from(payment_script),
        }];
        if change_sat > 0 {
            outputs.push(TxOut {
                value: Amount::from_sat(change_sat),
                script_pubkey: ScriptBuf::from(change_script),
            });
        }

        debug!(
            inputs = inputs.len(),
            outputs = outputs.len(),
            fee_sat = selection.fee_sat,
            change_sat,
            "built unsigned transaction"
        );

        Ok(UnsignedTransaction {
            tx: Transaction {
                version: Version::TWO,
                lock_time: LockTime::ZERO,
                input: inputs,
                output: outputs,
            },
            prevouts,
            fee_sat: selection.fee_sat,
            change_sat,
        })
    }
}

/// Spend template of a prevout, recognised by its locking script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScriptKind {
    P2pkh([u8; 20]),
    P2wpkh([u8; 20]),
    /// Assumed to wrap a P2WPKH redeem script.
    P2shP2wpkh([u8; 20]),
}

impl ScriptKind {
    fn classify(script: &[u8]) -> Result<Self, BtcError> {
        let hash = |range: std::ops::Range<usize>| {
            let mut out = [0u8; 20];
            out.copy_from_slice(&script[range]);
            out
        };

        match script {
            [0x76, 0xa9, 0x14, .., 0x88, 0xac] if script.len() == 25 => {
                Ok(Self::P2pkh(hash(3..23)))
            }
            [0x00, 0x14, ..] if script.len() == 22 => Ok(Self::P2wpkh(hash(2..22))),
            [0xa9, 0x14, .., 0x87] if script.len() == 23 => Ok(Self::P2shP2wpkh(hash(2..22))),
            _ => Err(BtcError::UnsupportedScriptType(format!(
                "cannot sign for script {}",
                hex::encode(script)
            ))),
        }
    }

    /// Whether `pubkey` unlocks this script.
    fn is_locked_to(&self, pubkey: &[u8; 33]) -> bool {
        match self {
            Self::P2pkh(h) | Self::P2wpkh(h) => *h == hash160(pubkey),
            Self::P2shP2wpkh(h) => *h == hash160(&p2sh_p2wpkh_redeem_script(pubkey)),
        }
    }
}

/// Collects signatures for an [`UnsignedTransaction`] one key at a time.
pub struct TransactionSigner<'a> {
    unsigned: &'a UnsignedTransaction,
    secp: Secp256k1<All>,
    kinds: Vec<ScriptKind>,
    partial_sigs: Vec<Vec<(PublicKey, ecdsa::Signature)>>,
}

impl<'a> TransactionSigner<'a> {
    /// Fails with `UnsupportedScriptType` if any prevout is not P2PKH,
    /// P2WPKH or P2SH.
    pub fn new(unsigned: &'a UnsignedTransaction) -> Result<Self, BtcError> {
        if unsigned.prevouts.len() != unsigned.tx.input.len() {
            return Err(BtcError::SigningFailed(format!(
                "{} prevouts for {} inputs",
                unsigned.prevouts.len(),
                unsigned.tx.input.len()
            )));
        }

        let kinds = unsigned
            .prevouts
            .iter()
            .map(|prevout| ScriptKind::classify(prevout.script_pubkey.as_bytes()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            unsigned,
            secp: Secp256k1::new(),
            partial_sigs: vec![Vec::new(); kinds.len()],
            kinds,
        })
    }

    /// Sign every input locked to `private_key`. Returns how many were signed.
    pub fn add_key(&mut self, private_key: &[u8; 32]) -> Result<usize, BtcError> {
        let secret_key = SecretKey::from_slice(private_key)
            .map_err(|e| BtcError::InvalidPrivateKey(e.to_string()))?;
        let public_key = PublicKey::from_secret_key(&self.secp, &secret_key);
        let pubkey_bytes = public_key.serialize();

        let mut cache = SighashCache::new(&self.unsigned.tx);
        let mut signed = 0;

        for (index, kind) in self.kinds.iter().enumerate() {
            if !kind.is_locked_to(&pubkey_bytes) {
                continue;
            }
            if self.partial_sigs[index].iter().any(|(pk, _)| *pk == public_key) {
                continue;
            }

            let digest = match kind {
                ScriptKind::P2pkh(_) => cache
                    .legacy_signature_hash(
                        index,
                        &self.unsigned.prevouts[index].script_pubkey,
                        EcdsaSighashType::All.to_u32(),
                    )
                    .map_err(|e| BtcError::SigningFailed(format!("input {index}: {e}")))?
                    .to_byte_array(),
                ScriptKind::P2wpkh(_) => cache
                    .p2wpkh_signature_hash(
                        index,
                        &self.unsigned.prevouts[index].script_pubkey,
                        self.unsigned.prevouts[index].value,
                        EcdsaSighashType::All,
                    )
                    .map_err(|e| BtcError::SigningFailed(format!("input {index}: {e}")))?
                    .to_byte_array(),
                ScriptKind::P2shP2wpkh(_) => {
                    let redeem = ScriptBuf::from(p2sh_p2wpkh_redeem_script(&pubkey_bytes));
                    cache
                        .p2wpkh_signature_hash(
                            index,
                            &redeem,
                            self.unsigned.prevouts[index].value,
                            EcdsaSighashType::All,
                        )
                        .map_err(|e| BtcError::SigningFailed(format!("input {index}: {e}")))?
                        .to_byte_array()
                }
            };

            let signature = self
                .secp
                .sign_ecdsa(&Message::from_digest(digest), &secret_key);
            self.partial_sigs[index].push((public_key, ecdsa::Signature::sighash_all(signature)));
            signed += 1;
        }

        debug!(signed, inputs = self.kinds.len(), "added signing key");
        Ok(signed)
    }

    /// Place the collected signatures into scriptSigs and witnesses.
    pub fn finalize(self) -> Result<SignedTransaction, BtcError> {
        let mut tx = self.unsigned.tx.clone();

        for (index, (kind, sigs)) in self.kinds.iter().zip(&self.partial_sigs).enumerate() {
            let (public_key, signature) = sigs.first().ok_or_else(|| match kind {
                ScriptKind::P2shP2wpkh(_) => BtcError::UnsupportedScriptType(format!(
                    "input {index}: no supplied key matches the P2SH redeem script hash; \
                     only P2SH-P2WPKH is supported"
                )),
                _ => BtcError::SigningFailed(format!("input {index} has no signature")),
            })?;
            let input = &mut tx.input[index];

            match kind {
                ScriptKind::P2pkh(_) => {
                    input.script_sig = ScriptBuf::builder()
                        .push_slice(push_bytes(signature.to_vec())?)
                        .push_slice(push_bytes(public_key.serialize().to_vec())?)
                        .into_script();
                }
                ScriptKind::P2wpkh(_) => {
                    input.witness = Witness::p2wpkh(signature, public_key);
                }
                ScriptKind::P2shP2wpkh(_) => {
                    let redeem = p2sh_p2wpkh_redeem_script(&public_key.serialize());
                    input.script_sig = ScriptBuf::builder()
                        .push_slice(push_bytes(redeem)?)
                        .into_script();
                    input.witness = Witness::p2wpkh(signature, public_key);
                }
            }
        }

        Ok(SignedTransaction { tx })
    }
}

fn push_bytes(data: Vec<u8>) -> Result<PushBytesBuf, BtcError> {
    PushBytesBuf::try_from(data).map_err(|e| BtcError::SigningFailed(e.to_string()))
}

/// Sign `unsigned` with each key in turn and finalize.
pub fn sign_transaction(
    unsigned: &UnsignedTransaction,
    private_keys: &[[u8; 32]],
) -> Result<SignedTransaction, BtcError> {
    let mut signer = TransactionSigner::new(unsigned)?;
    for key in private_keys {
        signer.add_key(key)?;
    }
    signer.finalize()
}

/// A fully signed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub tx: Transaction,
}

impl SignedTransaction {
    /// Wire-format bytes, with marker/flag only if an input has a witness.
    pub fn to_bytes(&self) -> Vec<u8> {
        bitcoin::consensus::serialize(&self.tx)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn txid(&self) -> String {
        self.tx.compute_txid().to_string()
    }

    pub fn vsize(&self) -> usize {
        self.tx.vsize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{estimate_fee, AddressType};
    use crate::utxo::SelectionStrategy;

    const RECIPIENT: &str = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";
    const TAPROOT: &str = "bc1p0xlxvlhemja6c4dqv22uapctqupfhlxm9h8z3k2e72q4k9hcz7vqzk5jj0";

    struct Wallet {
        secret: [u8; 32],
        pubkey: [u8; 33],
        address: String,
        script: Vec<u8>,
    }

    fn wallet(secret: [u8; 32], ty: AddressType) -> Wallet {
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(&secret).unwrap();
        let pubkey = PublicKey::from_secret_key(&secp, &sk).serialize();
        let generator = AddressGenerator::new(BtcNetwork::Mainnet);
        let address = generator.generate(&pubkey, ty).unwrap();
        let script = generator.script_pubkey(&address).unwrap();
        Wallet {
            secret,
            pubkey,
            address,
            script,
        }
    }

    fn utxo(txid_byte: &str, amount_sat: u64, script: &[u8]) -> Utxo {
        Utxo {
            txid: txid_byte.repeat(32),
            vout: 0,
            amount_sat,
            script_pubkey: script.to_vec(),
            confirmations: 3,
        }
    }

    fn request(from: &Wallet, utxos: Vec<Utxo>, amount_sat: u64, fee_rate: u64) -> TransactionRequest {
        TransactionRequest {
            utxos,
            from: from.address.clone(),
            to: RECIPIENT.to_string(),
            amount_sat,
            fee_rate,
            change_address: None,
            strategy: SelectionStrategy::LargestFirst,
        }
    }

    fn builder() -> TransactionBuilder {
        TransactionBuilder::new(BtcNetwork::Mainnet)
    }

    /// Recompute the sighash of `index` and verify the signature found in
    /// the finalized transaction.
    fn verify_input(signed: &SignedTransaction, unsigned: &UnsignedTransaction, index: usize, w: &Wallet) {
        let secp = Secp256k1::new();
        let pk = PublicKey::from_slice(&w.pubkey).unwrap();
        let mut cache = SighashCache::new(&unsigned.tx);
        let prevout = &unsigned.prevouts[index];
        let input = &signed.tx.input[index];

        let (sig_bytes, digest) = if input.witness.is_empty() {
            let sig = input.script_sig.instructions().next().unwrap().unwrap();
            let sig = sig.push_bytes().unwrap().as_bytes().to_vec();
            let digest = cache
                .legacy_signature_hash(index, &prevout.script_pubkey, 1)
                .unwrap()
                .to_byte_array();
            (sig, digest)
        } else {
            let script_code = if prevout.script_pubkey.is_p2sh() {
                ScriptBuf::from(p2sh_p2wpkh_redeem_script(&w.pubkey))
            } else {
                prevout.script_pubkey.clone()
            };
            let digest = cache
                .p2wpkh_signature_hash(index, &script_code, prevout.value, EcdsaSighashType::All)
                .unwrap()
                .to_byte_array();
            (input.witness.nth(0).unwrap().to_vec(), digest)
        };

        let sig = ecdsa::Signature::from_slice(&sig_bytes).unwrap();
        assert_eq!(sig.sighash_type, EcdsaSighashType::All);
        secp.verify_ecdsa(&Message::from_digest(digest), &sig.signature, &pk)
            .unwrap();
    }

    #[test]
    fn build_emits_payment_then_change() {
        let w = wallet([0x11; 32], AddressType::P2wpkh);
        let unsigned = builder()
            .build(&request(&w, vec![utxo("aa", 100_000, &w.script)], 50_000, 1))
            .unwrap();

        assert_eq!(unsigned.tx.version, Version::TWO);
        assert_eq!(unsigned.tx.lock_time, LockTime::ZERO);
        assert_eq!(unsigned.tx.input.len(), 1);
        assert_eq!(unsigned.tx.input[0].sequence.to_consensus_u32(), 0xffff_fffe);
        assert_eq!(unsigned.tx.output.len(), 2);
        assert_eq!(unsigned.tx.output[0].value.to_sat(), 50_000);
        assert_eq!(
            unsigned.tx.output[1].script_pubkey.as_bytes(),
            w.script.as_slice()
        );

        let fee = estimate_fee(1, 2, AddressType::P2wpkh, 1).unwrap();
        assert_eq!(unsigned.fee_sat, fee);
        assert_eq!(unsigned.change_sat, 100_000 - 50_000 - fee);
        assert_eq!(unsigned.tx.output[1].value.to_sat(), unsigned.change_sat);
    }

    #[test]
    fn zero_change_suppresses_change_output() {
        let w = wallet([0x11; 32], AddressType::P2wpkh);
        let fee = estimate_fee(1, 2, AddressType::P2wpkh, 1).unwrap();
        let unsigned = builder()
            .build(&request(&w, vec![utxo("aa", 50_000 + fee, &w.script)], 50_000, 1))
            .unwrap();
        assert_eq!(unsigned.tx.output.len(), 1);
        assert_eq!(unsigned.change_sat, 0);
        assert_eq!(unsigned.fee_sat, fee);
    }

    #[test]
    fn change_goes_to_explicit_change_address() {
        let w = wallet([0x11; 32], AddressType::P2wpkh);
        let change = wallet([0x22; 32], AddressType::P2pkh);
        let mut req = request(&w, vec![utxo("aa", 100_000, &w.script)], 10_000, 2);
        req.change_address = Some(change.address.clone());
        let unsigned = builder().build(&req).unwrap();
        assert_eq!(unsigned.tx.output[1].script_pubkey.as_bytes(), change.script.as_slice());
    }

    #[test]
    fn build_rejects_bad_requests() {
        let w = wallet([0x11; 32], AddressType::P2wpkh);
        let utxos = vec![utxo("aa", 100_000, &w.script)];

        let zero = request(&w, utxos.clone(), 0, 1);
        assert!(matches!(builder().build(&zero), Err(BtcError::TransactionBuildFailed(_))));

        let mut bad_to = request(&w, utxos.clone(), 1_000, 1);
        bad_to.to = "not_a_valid_address".into();
        assert!(matches!(builder().build(&bad_to), Err(BtcError::InvalidAddress(_))));

        let mut bad_change = request(&w, utxos.clone(), 1_000, 1);
        bad_change.change_address = Some("tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx".into());
        assert!(matches!(builder().build(&bad_change), Err(BtcError::InvalidAddress(_))));

        // Mainnet addresses on a testnet builder.
        let testnet = TransactionBuilder::new(BtcNetwork::Testnet);
        assert!(matches!(
            testnet.build(&request(&w, utxos.clone(), 1_000, 1)),
            Err(BtcError::InvalidAddress(_))
        ));

        let mut taproot_sender = request(&w, utxos.clone(), 1_000, 1);
        taproot_sender.from = TAPROOT.into();
        assert!(matches!(
            builder().build(&taproot_sender),
            Err(BtcError::UnsupportedScriptType(_))
        ));

        assert!(matches!(
            builder().build(&request(&w, utxos, 500_000, 1)),
            Err(BtcError::InsufficientFunds { .. })
        ));
        assert!(matches!(
            builder().build(&request(&w, Vec::new(), 1_000, 1)),
            Err(BtcError::NoUtxosAvailable)
        ));
    }

    #[test]
    fn build_rejects_malformed_txid() {
        let w = wallet([0x11; 32], AddressType::P2wpkh);
        let mut bad = utxo("aa", 100_000, &w.script);
        bad.txid = "zz".into();
        assert!(matches!(
            builder().build(&request(&w, vec![bad], 1_000, 1)),
            Err(BtcError::TransactionBuildFailed(_))
        ));
    }

    #[test]
    fn p2wpkh_signing_and_wire_layout() {
        let w = wallet([0x11; 32], AddressType::P2wpkh);
        let unsigned = builder()
            .build(&request(&w, vec![utxo("ab", 100_000, &w.script)], 50_000, 1))
            .unwrap();
        let signed = sign_transaction(&unsigned, &[w.secret]).unwrap();

        let bytes = signed.to_bytes();
        assert_eq!(&bytes[..4], &[0x02, 0x00, 0x00, 0x00]);
        assert_eq!(&bytes[4..6], &[0x00, 0x01]); // segwit marker and flag
        assert_eq!(bytes[6], 0x01); // input count
        assert_eq!(&bytes[7..39], &[0xab; 32]);
        assert_eq!(&bytes[39..43], &[0x00; 4]); // vout
        assert_eq!(bytes[43], 0x00); // empty scriptSig
        assert_eq!(&bytes[44..48], &[0xfe, 0xff, 0xff, 0xff]);
        assert_eq!(&bytes[bytes.len() - 4..], &[0x00; 4]);

        let input = &signed.tx.input[0];
        assert!(input.script_sig.is_empty());
        assert_eq!(input.witness.len(), 2);
        assert_eq!(input.witness.nth(1).unwrap(), w.pubkey.as_slice());
        verify_input(&signed, &unsigned, 0, &w);

        assert_eq!(signed.to_hex(), hex::encode(&bytes));
        assert_eq!(signed.txid().len(), 64);
        assert!((139..=142).contains(&signed.vsize()), "vsize {}", signed.vsize());
    }

    #[test]
    fn p2pkh_signing_has_no_witness_section() {
        let w = wallet([0x33; 32], AddressType::P2pkh);
        let unsigned = builder()
            .build(&request(&w, vec![utxo("cd", 100_000, &w.script)], 40_000, 2))
            .unwrap();
        let signed = sign_transaction(&unsigned, &[w.secret]).unwrap();

        let bytes = signed.to_bytes();
        assert_eq!(&bytes[..4], &[0x02, 0x00, 0x00, 0x00]);
        assert_eq!(bytes[4], 0x01); // input count directly, no marker
        assert_eq!(&bytes[bytes.len() - 4..], &[0x00; 4]);

        let input = &signed.tx.input[0];
        assert!(input.witness.is_empty());
        let pushes: Vec<_> = input
            .script_sig
            .instructions()
            .map(|i| i.unwrap().push_bytes().unwrap().as_bytes().to_vec())
            .collect();
        assert_eq!(pushes.len(), 2);
        assert_eq!(pushes[1], w.pubkey.to_vec());
        verify_input(&signed, &unsigned, 0, &w);

        // Legacy transactions have txid == wtxid and vsize == size.
        assert_eq!(signed.vsize(), bytes.len());
    }

    #[test]
    fn p2sh_p2wpkh_pushes_redeem_script_and_witness() {
        let w = wallet([0x44; 32], AddressType::P2shP2wpkh);
        let unsigned = builder()
            .build(&request(&w, vec![utxo("ef", 100_000, &w.script)], 40_000, 2))
            .unwrap();
        let signed = sign_transaction(&unsigned, &[w.secret]).unwrap();

        let input = &signed.tx.input[0];
        let redeem = p2sh_p2wpkh_redeem_script(&w.pubkey);
        let mut expected_sig = vec![0x16];
        expected_sig.extend_from_slice(&redeem);
        assert_eq!(input.script_sig.as_bytes(), expected_sig.as_slice());
        assert_eq!(input.witness.len(), 2);
        verify_input(&signed, &unsigned, 0, &w);
        assert_eq!(&signed.to_bytes()[4..6], &[0x00, 0x01]);
    }

    #[test]
    fn keys_accumulate_across_add_key_calls() {
        let a = wallet([0x55; 32], AddressType::P2wpkh);
        let b = wallet([0x66; 32], AddressType::P2wpkh);
        let utxos = vec![utxo("01", 30_000, &a.script), utxo("02", 30_000, &b.script)];
        let unsigned = builder().build(&request(&a, utxos, 50_000, 1)).unwrap();
        assert_eq!(unsigned.tx.input.len(), 2);

        let mut signer = TransactionSigner::new(&unsigned).unwrap();
        assert_eq!(signer.add_key(&a.secret).unwrap(), 1);
        assert_eq!(signer.add_key(&a.secret).unwrap(), 0);
        assert_eq!(signer.add_key(&b.secret).unwrap(), 1);
        let signed = signer.finalize().unwrap();

        for (index, input) in unsigned.tx.input.iter().enumerate() {
            let owner = if input.previous_output.txid.to_string() == "01".repeat(32) { &a } else { &b };
            verify_input(&signed, &unsigned, index, owner);
        }
    }

    #[test]
    fn missing_signature_fails_finalize() {
        let a = wallet([0x55; 32], AddressType::P2wpkh);
        let b = wallet([0x66; 32], AddressType::P2wpkh);
        let utxos = vec![utxo("01", 30_000, &a.script), utxo("02", 30_000, &b.script)];
        let unsigned = builder().build(&request(&a, utxos, 50_000, 1)).unwrap();

        assert!(matches!(
            sign_transaction(&unsigned, &[a.secret]),
            Err(BtcError::SigningFailed(_))
        ));
        let stranger = wallet([0x77; 32], AddressType::P2wpkh);
        let mut signer = TransactionSigner::new(&unsigned).unwrap();
        assert_eq!(signer.add_key(&stranger.secret).unwrap(), 0);
        assert!(matches!(signer.finalize(), Err(BtcError::SigningFailed(_))));
    }

    #[test]
    fn p2sh_prevout_without_matching_key_is_unsupported() {
        // A P2SH output whose redeem script is not P2WPKH of any supplied key,
        // e.g. a multisig.
        let w = wallet([0x44; 32], AddressType::P2shP2wpkh);
        let mut foreign_p2sh = vec![0xa9, 0x14];
        foreign_p2sh.extend_from_slice(&[0x5a; 20]);
        foreign_p2sh.push(0x87);
        let utxos = vec![utxo("05", 40_000, &w.script), utxo("06", 40_000, &foreign_p2sh)];
        let unsigned = builder().build(&request(&w, utxos, 60_000, 1)).unwrap();

        let result = sign_transaction(&unsigned, &[w.secret]);
        let Err(BtcError::UnsupportedScriptType(message)) = result else {
            panic!("expected UnsupportedScriptType, got {result:?}");
        };
        assert!(message.contains("P2SH redeem script hash"), "{message}");
    }

    #[test]
    fn mixed_legacy_and_segwit_inputs() {
        let legacy = wallet([0x12; 32], AddressType::P2pkh);
        let segwit = wallet([0x13; 32], AddressType::P2wpkh);
        let utxos = vec![
            utxo("03", 40_000, &legacy.script),
            utxo("04", 40_000, &segwit.script),
        ];
        let unsigned = builder().build(&request(&segwit, utxos, 60_000, 1)).unwrap();
        let signed = sign_transaction(&unsigned, &[legacy.secret, segwit.secret]).unwrap();

        for (index, input) in signed.tx.input.iter().enumerate() {
            if unsigned.prevouts[index].script_pubkey.is_p2pkh() {
                assert!(input.witness.is_empty());
                assert!(!input.script_sig.is_empty());
                verify_input(&signed, &unsigned, index, &legacy);
            } else {
                assert!(input.script_sig.is_empty());
                verify_input(&signed, &unsigned, index, &segwit);
            }
        }
        assert_eq!(&signed.to_bytes()[4..6], &[0x00, 0x01]);
    }

    #[test]
    fn unsupported_prevout_and_bad_key() {
        let w = wallet([0x11; 32], AddressType::P2wpkh);
        let mut taproot_script = vec![0x51, 0x20];
        taproot_script.extend_from_slice(&[0x09; 32]);
        let unsigned = builder()
            .build(&request(&w, vec![utxo("aa", 100_000, &taproot_script)], 10_000, 1))
            .unwrap();
        assert!(matches!(
            TransactionSigner::new(&unsigned),
            Err(BtcError::UnsupportedScriptType(_))
        ));

        let ok = builder()
            .build(&request(&w, vec![utxo("aa", 100_000, &w.script)], 10_000, 1))
            .unwrap();
        assert!(matches!(
            sign_transaction(&ok, &[[0u8; 32]]),
            Err(BtcError::InvalidPrivateKey(_))
        ));
    }
}
