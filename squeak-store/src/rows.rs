//! Diesel `Queryable`/`Insertable` row types and their conversions to/from
//! the domain entities in [`crate::domain`] and `squeak_crypto::ContentItem`.

use chrono::NaiveDateTime;
use diesel::prelude::*;
use squeak_common::{Hash32, MilliSats};
use squeak_crypto::{item::BlockHeader, Address, ContentItem};

use crate::{
    convert::{
        addr_to_host_port, bytes32_to_hex, hash_to_hex, hex_to_bytes32,
        hex_to_hash, host_port_to_addr, naive_to_timestamp,
        timestamp_to_naive,
    },
    domain::{Peer, ReceivedOffer, ReceivedPayment, SentOffer, SentPayment},
    error::StoreError,
    schema::*,
};

// --- item --- //

#[derive(Queryable)]
pub struct ItemRow {
    pub hash: String,
    pub created_at: NaiveDateTime,
    pub author_address: String,
    pub author_pubkey: String,
    pub signature: String,
    pub reply_hash: String,
    pub block_height: i64,
    pub block_time: i64,
    pub block_header: Vec<u8>,
    pub ciphertext: Vec<u8>,
    pub decryption_key: Option<String>,
    pub liked_at: Option<NaiveDateTime>,
}

#[derive(Insertable)]
#[diesel(table_name = item)]
pub struct NewItemRow {
    pub hash: String,
    pub created_at: NaiveDateTime,
    pub author_address: String,
    pub author_pubkey: String,
    pub signature: String,
    pub reply_hash: String,
    pub block_height: i64,
    pub block_time: i64,
    pub block_header: Vec<u8>,
    pub ciphertext: Vec<u8>,
    pub decryption_key: Option<String>,
    pub liked_at: Option<NaiveDateTime>,
}

impl TryFrom<&ContentItem> for NewItemRow {
    type Error = StoreError;

    fn try_from(it: &ContentItem) -> Result<Self, Self::Error> {
        Ok(Self {
            hash: hash_to_hex(it.hash),
            created_at: timestamp_to_naive(it.created_at),
            author_address: it.author_address.as_str().to_owned(),
            author_pubkey: hex::encode(it.author_pubkey.serialize()),
            signature: hex::encode(it.signature.serialize_compact()),
            reply_hash: hash_to_hex(it.reply_hash),
            block_height: it.block_height,
            block_time: it.block_time,
            block_header: it.block_header.as_bytes().to_vec(),
            ciphertext: it.ciphertext.clone(),
            decryption_key: it.decryption_key.as_ref().map(bytes32_to_hex),
            liked_at: it.liked_at.map(timestamp_to_naive),
        })
    }
}

impl TryFrom<ItemRow> for ContentItem {
    type Error = StoreError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        let author_pubkey_bytes = hex::decode(&row.author_pubkey)
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        let author_pubkey =
            secp256k1::PublicKey::from_slice(&author_pubkey_bytes)
                .map_err(|e| StoreError::Decode(e.to_string()))?;
        let signature_bytes = hex::decode(&row.signature)
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        let signature =
            secp256k1::ecdsa::Signature::from_compact(&signature_bytes)
                .map_err(|e| StoreError::Decode(e.to_string()))?;

        Ok(ContentItem {
            hash: hex_to_hash(&row.hash).map_err(|e| StoreError::Decode(e.to_string()))?,
            author_address: row
                .author_address
                .parse::<Address>()
                .map_err(|e| StoreError::Decode(e.to_string()))?,
            author_pubkey,
            signature,
            reply_hash: hex_to_hash(&row.reply_hash)
                .map_err(|e| StoreError::Decode(e.to_string()))?,
            block_height: row.block_height,
            block_time: row.block_time,
            block_header: BlockHeader(row.block_header),
            ciphertext: row.ciphertext,
            decryption_key: row
                .decryption_key
                .as_deref()
                .map(hex_to_bytes32)
                .transpose()
                .map_err(|e| StoreError::Decode(e.to_string()))?,
            created_at: naive_to_timestamp(row.created_at),
            liked_at: row.liked_at.map(naive_to_timestamp),
        })
    }
}

// --- profile --- //

#[derive(Queryable)]
pub struct ProfileRow {
    pub profile_id: i32,
    pub created_at: NaiveDateTime,
    pub name: String,
    pub private_key: Option<String>,
    pub address: String,
    pub sharing: bool,
    pub following: bool,
    pub image: Option<Vec<u8>>,
}

#[derive(Insertable)]
#[diesel(table_name = profile)]
pub struct NewProfileRow {
    pub created_at: NaiveDateTime,
    pub name: String,
    pub private_key: Option<String>,
    pub address: String,
    pub sharing: bool,
    pub following: bool,
    pub image: Option<Vec<u8>>,
}

impl TryFrom<ProfileRow> for crate::domain::Profile {
    type Error = StoreError;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        Ok(Self {
            profile_id: row.profile_id,
            created_at: naive_to_timestamp(row.created_at),
            name: row.name,
            private_key: row
                .private_key
                .as_deref()
                .map(hex_to_bytes32)
                .transpose()
                .map_err(|e| StoreError::Decode(e.to_string()))?,
            address: row
                .address
                .parse::<Address>()
                .map_err(|e| StoreError::Decode(e.to_string()))?,
            sharing: row.sharing,
            following: row.following,
            image: row.image,
        })
    }
}

// --- peer --- //

#[derive(Queryable)]
pub struct PeerRow {
    pub peer_id: i32,
    pub created_at: NaiveDateTime,
    pub name: String,
    pub host: String,
    pub port: i32,
    pub uploading: bool,
    pub downloading: bool,
}

#[derive(Insertable)]
#[diesel(table_name = peer)]
pub struct NewPeerRow {
    pub created_at: NaiveDateTime,
    pub name: String,
    pub host: String,
    pub port: i32,
    pub uploading: bool,
    pub downloading: bool,
}

impl TryFrom<PeerRow> for Peer {
    type Error = StoreError;

    fn try_from(row: PeerRow) -> Result<Self, Self::Error> {
        Ok(Self {
            peer_id: row.peer_id,
            created_at: naive_to_timestamp(row.created_at),
            name: row.name,
            addr: host_port_to_addr(&row.host, row.port)
                .map_err(|e| StoreError::Decode(e.to_string()))?,
            uploading: row.uploading,
            downloading: row.downloading,
        })
    }
}

// --- sent_offer --- //

#[derive(Queryable)]
pub struct SentOfferRow {
    pub sent_offer_id: i64,
    pub created_at: NaiveDateTime,
    pub item_hash: String,
    pub payment_hash: String,
    pub secret_key: String,
    pub nonce: String,
    pub price_msat: i64,
    pub payment_request: String,
    pub invoice_timestamp: i64,
    pub invoice_expiry: i64,
    pub client_host: String,
    pub client_port: i32,
    pub paid: bool,
}

#[derive(Insertable)]
#[diesel(table_name = sent_offer)]
pub struct NewSentOfferRow {
    pub created_at: NaiveDateTime,
    pub item_hash: String,
    pub payment_hash: String,
    pub secret_key: String,
    pub nonce: String,
    pub price_msat: i64,
    pub payment_request: String,
    pub invoice_timestamp: i64,
    pub invoice_expiry: i64,
    pub client_host: String,
    pub client_port: i32,
    pub paid: bool,
}

impl From<&SentOffer> for NewSentOfferRow {
    fn from(s: &SentOffer) -> Self {
        let (client_host, client_port) = addr_to_host_port(s.client_addr);
        Self {
            created_at: timestamp_to_naive(s.created_at),
            item_hash: hash_to_hex(s.item_hash),
            payment_hash: hash_to_hex(s.payment_hash),
            secret_key: bytes32_to_hex(&s.secret_key),
            nonce: bytes32_to_hex(&s.nonce),
            price_msat: s.price_msat.msat() as i64,
            payment_request: s.payment_request.clone(),
            invoice_timestamp: s.invoice_timestamp,
            invoice_expiry: s.invoice_expiry,
            client_host,
            client_port,
            paid: s.paid,
        }
    }
}

impl TryFrom<SentOfferRow> for SentOffer {
    type Error = StoreError;

    fn try_from(row: SentOfferRow) -> Result<Self, Self::Error> {
        Ok(Self {
            sent_offer_id: row.sent_offer_id,
            created_at: naive_to_timestamp(row.created_at),
            item_hash: hex_to_hash(&row.item_hash)
                .map_err(|e| StoreError::Decode(e.to_string()))?,
            payment_hash: hex_to_hash(&row.payment_hash)
                .map_err(|e| StoreError::Decode(e.to_string()))?,
            secret_key: hex_to_bytes32(&row.secret_key)
                .map_err(|e| StoreError::Decode(e.to_string()))?,
            nonce: hex_to_bytes32(&row.nonce)
                .map_err(|e| StoreError::Decode(e.to_string()))?,
            price_msat: MilliSats::from_msat(row.price_msat as u64),
            payment_request: row.payment_request,
            invoice_timestamp: row.invoice_timestamp,
            invoice_expiry: row.invoice_expiry,
            client_addr: host_port_to_addr(&row.client_host, row.client_port)
                .map_err(|e| StoreError::Decode(e.to_string()))?,
            paid: row.paid,
        })
    }
}

// --- received_offer --- //

#[derive(Queryable)]
pub struct ReceivedOfferRow {
    pub received_offer_id: i64,
    pub created_at: NaiveDateTime,
    pub item_hash: String,
    pub payment_hash: String,
    pub nonce: String,
    pub payment_point: String,
    pub invoice_timestamp: i64,
    pub invoice_expiry: i64,
    pub price_msat: i64,
    pub payment_request: String,
    pub destination: String,
    pub lightning_host: String,
    pub lightning_port: i32,
    pub peer_host: String,
    pub peer_port: i32,
    pub paid: bool,
}

#[derive(Insertable)]
#[diesel(table_name = received_offer)]
pub struct NewReceivedOfferRow {
    pub created_at: NaiveDateTime,
    pub item_hash: String,
    pub payment_hash: String,
    pub nonce: String,
    pub payment_point: String,
    pub invoice_timestamp: i64,
    pub invoice_expiry: i64,
    pub price_msat: i64,
    pub payment_request: String,
    pub destination: String,
    pub lightning_host: String,
    pub lightning_port: i32,
    pub peer_host: String,
    pub peer_port: i32,
    pub paid: bool,
}

impl From<&ReceivedOffer> for NewReceivedOfferRow {
    fn from(r: &ReceivedOffer) -> Self {
        let (lightning_host, lightning_port) = addr_to_host_port(r.lightning_addr);
        let (peer_host, peer_port) = addr_to_host_port(r.peer_addr);
        Self {
            created_at: timestamp_to_naive(r.created_at),
            item_hash: hash_to_hex(r.item_hash),
            payment_hash: hash_to_hex(r.payment_hash),
            nonce: bytes32_to_hex(&r.nonce),
            payment_point: hex::encode(&r.payment_point),
            invoice_timestamp: r.invoice_timestamp,
            invoice_expiry: r.invoice_expiry,
            price_msat: r.price_msat.msat() as i64,
            payment_request: r.payment_request.clone(),
            destination: r.destination.clone(),
            lightning_host,
            lightning_port,
            peer_host,
            peer_port,
            paid: r.paid,
        }
    }
}

impl TryFrom<ReceivedOfferRow> for ReceivedOffer {
    type Error = StoreError;

    fn try_from(row: ReceivedOfferRow) -> Result<Self, Self::Error> {
        Ok(Self {
            received_offer_id: row.received_offer_id,
            created_at: naive_to_timestamp(row.created_at),
            item_hash: hex_to_hash(&row.item_hash)
                .map_err(|e| StoreError::Decode(e.to_string()))?,
            payment_hash: hex_to_hash(&row.payment_hash)
                .map_err(|e| StoreError::Decode(e.to_string()))?,
            nonce: hex_to_bytes32(&row.nonce)
                .map_err(|e| StoreError::Decode(e.to_string()))?,
            payment_point: hex::decode(&row.payment_point)
                .map_err(|e| StoreError::Decode(e.to_string()))?,
            invoice_timestamp: row.invoice_timestamp,
            invoice_expiry: row.invoice_expiry,
            price_msat: MilliSats::from_msat(row.price_msat as u64),
            payment_request: row.payment_request,
            destination: row.destination,
            lightning_addr: host_port_to_addr(&row.lightning_host, row.lightning_port)
                .map_err(|e| StoreError::Decode(e.to_string()))?,
            peer_addr: host_port_to_addr(&row.peer_host, row.peer_port)
                .map_err(|e| StoreError::Decode(e.to_string()))?,
            paid: row.paid,
        })
    }
}

// --- sent_payment --- //

#[derive(Queryable)]
pub struct SentPaymentRow {
    pub sent_payment_id: i64,
    pub created_at: NaiveDateTime,
    pub peer_host: String,
    pub peer_port: i32,
    pub item_hash: String,
    pub payment_hash: String,
    pub secret_key: String,
    pub price_msat: i64,
    pub node_pubkey: String,
    pub valid: bool,
}

#[derive(Insertable)]
#[diesel(table_name = sent_payment)]
pub struct NewSentPaymentRow {
    pub created_at: NaiveDateTime,
    pub peer_host: String,
    pub peer_port: i32,
    pub item_hash: String,
    pub payment_hash: String,
    pub secret_key: String,
    pub price_msat: i64,
    pub node_pubkey: String,
    pub valid: bool,
}

impl From<&SentPayment> for NewSentPaymentRow {
    fn from(s: &SentPayment) -> Self {
        let (peer_host, peer_port) = addr_to_host_port(s.peer_addr);
        Self {
            created_at: timestamp_to_naive(s.created_at),
            peer_host,
            peer_port,
            item_hash: hash_to_hex(s.item_hash),
            payment_hash: hash_to_hex(s.payment_hash),
            secret_key: bytes32_to_hex(&s.secret_key),
            price_msat: s.price_msat.msat() as i64,
            node_pubkey: s.node_pubkey.clone(),
            valid: s.valid,
        }
    }
}

impl TryFrom<SentPaymentRow> for SentPayment {
    type Error = StoreError;

    fn try_from(row: SentPaymentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            sent_payment_id: row.sent_payment_id,
            created_at: naive_to_timestamp(row.created_at),
            peer_addr: host_port_to_addr(&row.peer_host, row.peer_port)
                .map_err(|e| StoreError::Decode(e.to_string()))?,
            item_hash: hex_to_hash(&row.item_hash)
                .map_err(|e| StoreError::Decode(e.to_string()))?,
            payment_hash: hex_to_hash(&row.payment_hash)
                .map_err(|e| StoreError::Decode(e.to_string()))?,
            secret_key: hex_to_bytes32(&row.secret_key)
                .map_err(|e| StoreError::Decode(e.to_string()))?,
            price_msat: MilliSats::from_msat(row.price_msat as u64),
            node_pubkey: row.node_pubkey,
            valid: row.valid,
        })
    }
}

// --- received_payment --- //

#[derive(Queryable)]
pub struct ReceivedPaymentRow {
    pub received_payment_id: i64,
    pub created_at: NaiveDateTime,
    pub item_hash: String,
    pub payment_hash: String,
    pub price_msat: i64,
    pub settle_index: i64,
    pub client_host: String,
    pub client_port: i32,
}

#[derive(Insertable)]
#[diesel(table_name = received_payment)]
pub struct NewReceivedPaymentRow {
    pub created_at: NaiveDateTime,
    pub item_hash: String,
    pub payment_hash: String,
    pub price_msat: i64,
    pub settle_index: i64,
    pub client_host: String,
    pub client_port: i32,
}

impl From<&ReceivedPayment> for NewReceivedPaymentRow {
    fn from(r: &ReceivedPayment) -> Self {
        let (client_host, client_port) = addr_to_host_port(r.client_addr);
        Self {
            created_at: timestamp_to_naive(r.created_at),
            item_hash: hash_to_hex(r.item_hash),
            payment_hash: hash_to_hex(r.payment_hash),
            price_msat: r.price_msat.msat() as i64,
            settle_index: r.settle_index,
            client_host,
            client_port,
        }
    }
}

impl TryFrom<ReceivedPaymentRow> for ReceivedPayment {
    type Error = StoreError;

    fn try_from(row: ReceivedPaymentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            received_payment_id: row.received_payment_id,
            created_at: naive_to_timestamp(row.created_at),
            item_hash: hex_to_hash(&row.item_hash)
                .map_err(|e| StoreError::Decode(e.to_string()))?,
            payment_hash: hex_to_hash(&row.payment_hash)
                .map_err(|e| StoreError::Decode(e.to_string()))?,
            price_msat: MilliSats::from_msat(row.price_msat as u64),
            settle_index: row.settle_index,
            client_addr: host_port_to_addr(&row.client_host, row.client_port)
                .map_err(|e| StoreError::Decode(e.to_string()))?,
        })
    }
}
