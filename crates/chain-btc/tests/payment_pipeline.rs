//! End-to-end engine tests: seed -> derived address -> selection ->
//! unsigned transaction -> signatures -> wire bytes.

use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{Message, PublicKey, Secp256k1};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::{consensus, ecdsa, Transaction};

use chain_btc::address::{estimate_fee, estimate_transaction_size, AddressGenerator, AddressType};
use chain_btc::codec::bech32;
use chain_btc::error::BtcError;
use chain_btc::hd::{default_path, derive_address, derive_key};
use chain_btc::network::BtcNetwork;
use chain_btc::transaction::{sign_transaction, TransactionBuilder, TransactionRequest};
use chain_btc::utxo::{SelectionStrategy, Utxo, UtxoSelector};

const TEST_MNEMONIC: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

fn test_seed() -> Vec<u8> {
    bip39::Mnemonic::parse_in_normalized(bip39::Language::English, TEST_MNEMONIC)
        .unwrap()
        .to_seed("")
        .to_vec()
}

fn funding(script: &[u8], amounts: &[u64]) -> Vec<Utxo> {
    amounts
        .iter()
        .enumerate()
        .map(|(i, &amount_sat)| Utxo {
            txid: format!("{:064x}", i + 1),
            vout: i as u32,
            amount_sat,
            script_pubkey: script.to_vec(),
            confirmations: 1,
        })
        .collect()
}

#[test]
fn derived_p2wpkh_wallet_pays_and_signs() {
    let seed = test_seed();
    let generator = AddressGenerator::new(BtcNetwork::Testnet);
    let path = default_path(AddressType::P2wpkh, BtcNetwork::Testnet, 0, 0, 0);
    let sender = derive_address(&generator, &seed, &path, AddressType::P2wpkh).unwrap();
    let key = derive_key(&seed, &path).unwrap();
    assert!(sender.address.starts_with("tb1q"));

    let recipient_path = default_path(AddressType::P2pkh, BtcNetwork::Testnet, 0, 0, 1);
    let recipient = derive_address(&generator, &seed, &recipient_path, AddressType::P2pkh).unwrap();

    let script = generator.script_pubkey(&sender.address).unwrap();
    let request = TransactionRequest {
        utxos: funding(&script, &[100_000, 50_000, 30_000]),
        from: sender.address.clone(),
        to: recipient.address.clone(),
        amount_sat: 120_000,
        fee_rate: 10,
        change_address: None,
        strategy: SelectionStrategy::Optimal,
    };

    let unsigned = TransactionBuilder::new(BtcNetwork::Testnet)
        .build(&request)
        .unwrap();
    assert_eq!(unsigned.tx.input.len(), 2);
    assert_eq!(unsigned.fee_sat, 2_080);
    assert_eq!(unsigned.change_sat, 130_000 - 120_000 - 2_080);

    let signed = sign_transaction(&unsigned, &[key.private_key]).unwrap();

    // Wire bytes decode back into the same transaction.
    let decoded: Transaction = consensus::deserialize(&signed.to_bytes()).unwrap();
    assert_eq!(decoded, signed.tx);
    assert_eq!(decoded.compute_txid().to_string(), signed.txid());

    let secp = Secp256k1::verification_only();
    let pubkey = PublicKey::from_slice(&key.public_key).unwrap();
    let mut cache = SighashCache::new(&unsigned.tx);
    for (index, input) in signed.tx.input.iter().enumerate() {
        let prevout = &unsigned.prevouts[index];
        let digest = cache
            .p2wpkh_signature_hash(index, &prevout.script_pubkey, prevout.value, EcdsaSighashType::All)
            .unwrap();
        let sig = ecdsa::Signature::from_slice(input.witness.nth(0).unwrap()).unwrap();
        secp.verify_ecdsa(&Message::from_digest(digest.to_byte_array()), &sig.signature, &pubkey)
            .unwrap();
    }
}

#[test]
fn p2wpkh_address_decodes_to_pubkey_hash() {
    let seed = test_seed();
    let generator = AddressGenerator::new(BtcNetwork::Mainnet);
    let path = default_path(AddressType::P2wpkh, BtcNetwork::Mainnet, 0, 0, 0);
    let derived = derive_address(&generator, &seed, &path, AddressType::P2wpkh).unwrap();

    assert!(derived.address.starts_with("bc1"));
    assert_eq!(derived.address.len(), 42);
    let decoded = bech32::decode(&derived.address).unwrap();
    assert_eq!(decoded.witness_version, 0);
    assert_eq!(decoded.program, chain_btc::address::hash160(&derived.public_key).to_vec());
}

#[test]
fn corrupted_last_character_fails_validation() {
    let generator = AddressGenerator::new(BtcNetwork::Mainnet);
    for (valid, corrupted) in [
        ("1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH", "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMJ"),
        (
            "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4",
            "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t5",
        ),
    ] {
        assert!(generator.validate(valid));
        assert!(!generator.validate(corrupted));
    }
}

#[test]
fn consolidation_of_small_coins() {
    let generator = AddressGenerator::new(BtcNetwork::Mainnet);
    let script = generator
        .script_pubkey("bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4")
        .unwrap();
    let utxos = funding(&script, &[1_000; 20]);
    let selector = UtxoSelector::new(AddressType::P2wpkh);

    let selection = selector.consolidate(&utxos, 5).unwrap();
    assert_eq!(
        selection.fee_sat,
        estimate_transaction_size(20, 1, AddressType::P2wpkh) * 5
    );
    assert!(matches!(
        selector.consolidate(&utxos, 15),
        Err(BtcError::InsufficientFunds { available: 20_000, .. })
    ));
}

#[test]
fn legacy_sender_pays_legacy_fee() {
    let seed = test_seed();
    let generator = AddressGenerator::new(BtcNetwork::Mainnet);
    let path = default_path(AddressType::P2pkh, BtcNetwork::Mainnet, 0, 0, 0);
    let sender = derive_address(&generator, &seed, &path, AddressType::P2pkh).unwrap();
    let key = derive_key(&seed, &path).unwrap();
    let script = generator.script_pubkey(&sender.address).unwrap();

    let request = TransactionRequest {
        utxos: funding(&script, &[80_000]),
        from: sender.address.clone(),
        to: "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4".into(),
        amount_sat: 25_000,
        fee_rate: 3,
        change_address: None,
        strategy: SelectionStrategy::default(),
    };
    let unsigned = TransactionBuilder::new(BtcNetwork::Mainnet)
        .build(&request)
        .unwrap();
    assert_eq!(unsigned.fee_sat, estimate_fee(1, 2, AddressType::P2pkh, 3).unwrap());

    let signed = sign_transaction(&unsigned, &[key.private_key]).unwrap();
    assert!(signed.tx.input[0].witness.is_empty());
    // No segwit marker: version is followed directly by the input count.
    assert_eq!(signed.to_bytes()[4], 0x01);
}
