// Normally produced by `diesel print-schema`; committed by hand here since
// we never invoke the diesel CLI. Keep in lockstep with
// `migrations/2024-01-01-000000_init`.

diesel::table! {
    item (hash) {
        hash -> Text,
        created_at -> Timestamp,
        author_address -> Text,
        author_pubkey -> Text,
        signature -> Text,
        reply_hash -> Text,
        block_height -> BigInt,
        block_time -> BigInt,
        block_header -> Binary,
        ciphertext -> Binary,
        decryption_key -> Nullable<Text>,
        liked_at -> Nullable<Timestamp>,
    }
}

diesel::table! {
    profile (profile_id) {
        profile_id -> Integer,
        created_at -> Timestamp,
        name -> Text,
        private_key -> Nullable<Text>,
        address -> Text,
        sharing -> Bool,
        following -> Bool,
        image -> Nullable<Binary>,
    }
}

diesel::table! {
    peer (peer_id) {
        peer_id -> Integer,
        created_at -> Timestamp,
        name -> Text,
        host -> Text,
        port -> Integer,
        uploading -> Bool,
        downloading -> Bool,
    }
}

diesel::table! {
    sent_offer (sent_offer_id) {
        sent_offer_id -> BigInt,
        created_at -> Timestamp,
        item_hash -> Text,
        payment_hash -> Text,
        secret_key -> Text,
        nonce -> Text,
        price_msat -> BigInt,
        payment_request -> Text,
        invoice_timestamp -> BigInt,
        invoice_expiry -> BigInt,
        client_host -> Text,
        client_port -> Integer,
        paid -> Bool,
    }
}

diesel::table! {
    received_offer (received_offer_id) {
        received_offer_id -> BigInt,
        created_at -> Timestamp,
        item_hash -> Text,
        payment_hash -> Text,
        nonce -> Text,
        payment_point -> Text,
        invoice_timestamp -> BigInt,
        invoice_expiry -> BigInt,
        price_msat -> BigInt,
        payment_request -> Text,
        destination -> Text,
        lightning_host -> Text,
        lightning_port -> Integer,
        peer_host -> Text,
        peer_port -> Integer,
        paid -> Bool,
    }
}

diesel::table! {
    sent_payment (sent_payment_id) {
        sent_payment_id -> BigInt,
        created_at -> Timestamp,
        peer_host -> Text,
        peer_port -> Integer,
        item_hash -> Text,
        payment_hash -> Text,
        secret_key -> Text,
        price_msat -> BigInt,
        node_pubkey -> Text,
        valid -> Bool,
    }
}

diesel::table! {
    received_payment (received_payment_id) {
        received_payment_id -> BigInt,
        created_at -> Timestamp,
        item_hash -> Text,
        payment_hash -> Text,
        price_msat -> BigInt,
        settle_index -> BigInt,
        client_host -> Text,
        client_port -> Integer,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    item,
    profile,
    peer,
    sent_offer,
    received_offer,
    sent_payment,
    received_payment,
);
