//! Transaction building and signing
//!
//! Two jobs: build the tip transfer that heads every bundle, and re-sign
//! pre-built swap transactions fetched from the quote service. The relay
//! requires base58 for bundle payloads; base64 is never emitted here.

use base64::Engine;
use solana_sdk::hash::Hash;
use solana_sdk::message::{Message, VersionedMessage};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::system_instruction;
use solana_sdk::transaction::VersionedTransaction;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::rpc::RpcApi;
use crate::signer::{SignerCapability, SIGNATURE_LEN};

/// Builds and signs tip and swap transactions
pub struct TxFactory {
    signer: Arc<dyn SignerCapability>,
    rpc: Arc<dyn RpcApi>,
}

impl TxFactory {
    pub fn new(signer: Arc<dyn SignerCapability>, rpc: Arc<dyn RpcApi>) -> Self {
        Self { signer, rpc }
    }

    /// Public key of the paying wallet
    pub fn payer(&self) -> Pubkey {
        self.signer.pubkey()
    }

    /// Build a signed tip transaction, returned base58-encoded
    pub async fn build_tip(&self, lamports: u64, tip_account: &str) -> Result<String> {
        let blockhash = self.rpc.latest_blockhash().await?;
        self.build_tip_with_blockhash(lamports, tip_account, blockhash)
    }

    /// Build a signed tip transaction against a known blockhash
    pub fn build_tip_with_blockhash(
        &self,
        lamports: u64,
        tip_account: &str,
        blockhash: Hash,
    ) -> Result<String> {
        let to_account = Pubkey::from_str(tip_account)
            .map_err(|e| Error::TransactionBuild(format!("bad tip account: {}", e)))?;

        let payer = self.signer.pubkey();
        let instruction = system_instruction::transfer(&payer, &to_account, lamports);

        let message = Message::new_with_blockhash(&[instruction], Some(&payer), &blockhash);
        let message = VersionedMessage::Legacy(message);

        let message_bytes = message.serialize();
        let signature = self.signer.sign(&message_bytes)?;
        if signature.as_ref().len() != SIGNATURE_LEN {
            return Err(Error::InvalidSignatureLength(signature.as_ref().len()));
        }

        let transaction = VersionedTransaction {
            signatures: vec![signature],
            message,
        };

        let bytes = bincode::serialize(&transaction)
            .map_err(|e| Error::Serialization(format!("tip tx: {}", e)))?;

        Ok(bs58::encode(bytes).into_string())
    }

    /// Re-sign an unsigned swap transaction from the quote service
    ///
    /// Input is a base64-encoded versioned transaction; output is the raw
    /// signed bytes (the relay layer handles encoding).
    pub fn resign_swap(&self, swap_transaction_b64: &str) -> Result<Vec<u8>> {
        let raw = base64::engine::general_purpose::STANDARD
            .decode(swap_transaction_b64)
            .map_err(|e| Error::TransactionDecode(format!("base64: {}", e)))?;

        let mut transaction: VersionedTransaction = bincode::deserialize(&raw)
            .map_err(|e| Error::TransactionDecode(format!("versioned tx: {}", e)))?;

        let message_bytes = transaction.message.serialize();
        let signature = self.signer.sign(&message_bytes)?;
        if signature.as_ref().len() != SIGNATURE_LEN {
            return Err(Error::InvalidSignatureLength(signature.as_ref().len()));
        }

        let required = transaction.message.header().num_required_signatures as usize;
        if required == 0 {
            return Err(Error::TransactionDecode(
                "swap tx requires no signatures".into(),
            ));
        }
        transaction
            .signatures
            .resize(required, solana_sdk::signature::Signature::default());
        // Fee payer signature lives in slot 0
        transaction.signatures[0] = signature;

        bincode::serialize(&transaction)
            .map_err(|e| Error::Serialization(format!("swap tx: {}", e)))
    }
}

/// Max acceptable cost after applying slippage in basis points
pub fn max_cost_with_slippage(expected: u64, slippage_bps: u32) -> u64 {
    expected.saturating_add(expected.saturating_mul(slippage_bps as u64) / 10_000)
}

/// Min acceptable output after applying slippage in basis points
pub fn min_output_with_slippage(expected: u64, slippage_bps: u32) -> u64 {
    expected.saturating_sub(expected.saturating_mul(slippage_bps as u64) / 10_000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::KeypairSigner;
    use async_trait::async_trait;
    use solana_sdk::signature::Keypair;

    struct FixedRpc;

    #[async_trait]
    impl RpcApi for FixedRpc {
        async fn latest_blockhash(&self) -> Result<Hash> {
            Ok(Hash::new_unique())
        }

        async fn wallet_tokens(&self, _owner: &str) -> Result<Vec<crate::rpc::WalletToken>> {
            Ok(vec![])
        }
    }

    fn factory() -> TxFactory {
        TxFactory::new(
            Arc::new(KeypairSigner::new(Keypair::new())),
            Arc::new(FixedRpc),
        )
    }

    #[tokio::test]
    async fn test_tip_tx_roundtrip() {
        let factory = factory();
        let tip_account = Pubkey::new_unique().to_string();
        let encoded = factory.build_tip(5000, &tip_account).await.unwrap();

        let bytes = bs58::decode(&encoded).into_vec().unwrap();
        let tx: VersionedTransaction = bincode::deserialize(&bytes).unwrap();
        assert_eq!(tx.signatures.len(), 1);
        assert_eq!(tx.signatures[0].as_ref().len(), SIGNATURE_LEN);

        // Signature must verify against the serialized message
        let message_bytes = tx.message.serialize();
        assert!(tx.signatures[0].verify(factory.payer().as_ref(), &message_bytes));
    }

    #[tokio::test]
    async fn test_tip_tx_rejects_bad_account() {
        let factory = factory();
        assert!(factory.build_tip(5000, "not-a-pubkey").await.is_err());
    }

    #[test]
    fn test_resign_swap() {
        let factory = factory();
        let payer = factory.payer();

        // Fabricate an unsigned transfer as the "quote service" output
        let instruction =
            system_instruction::transfer(&payer, &Pubkey::new_unique(), 1_000_000);
        let message = VersionedMessage::Legacy(Message::new_with_blockhash(
            &[instruction],
            Some(&payer),
            &Hash::new_unique(),
        ));
        let unsigned = VersionedTransaction {
            signatures: vec![],
            message,
        };
        let b64 = base64::engine::general_purpose::STANDARD
            .encode(bincode::serialize(&unsigned).unwrap());

        let signed_bytes = factory.resign_swap(&b64).unwrap();
        let signed: VersionedTransaction = bincode::deserialize(&signed_bytes).unwrap();
        assert_eq!(signed.signatures.len(), 1);

        let message_bytes = signed.message.serialize();
        assert!(signed.signatures[0].verify(payer.as_ref(), &message_bytes));
    }

    #[test]
    fn test_resign_swap_rejects_garbage() {
        let factory = factory();
        assert!(factory.resign_swap("!!!not-base64!!!").is_err());
        let b64 = base64::engine::general_purpose::STANDARD.encode([0u8; 4]);
        assert!(factory.resign_swap(&b64).is_err());
    }

    #[test]
    fn test_slippage_helpers() {
        assert_eq!(max_cost_with_slippage(1_000_000_000, 2500), 1_250_000_000);
        assert_eq!(min_output_with_slippage(1_000_000_000, 2500), 750_000_000);
        assert_eq!(max_cost_with_slippage(0, 2500), 0);
    }
}
