//! The relational persistence layer (spec §4.9).
//!
//! Diesel's synchronous API is wrapped in `spawn_blocking` so callers above
//! us stay on the async executor; each call checks out its own pooled
//! connection, matching how `r2d2` is meant to be used under a multi-threaded
//! runtime.

use std::sync::Arc;

use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use squeak_common::{Hash32, MilliSats, PeerAddr, Timestamp};
use squeak_crypto::{Address, ContentItem};

use crate::{
    convert::{hash_to_hex, timestamp_to_naive},
    domain::{Peer, Profile, ReceivedOffer, ReceivedPayment, SentOffer, SentPayment},
    error::StoreError,
    rows::{
        ItemRow, NewItemRow, NewPeerRow, NewProfileRow, NewReceivedOfferRow,
        NewReceivedPaymentRow, NewSentOfferRow, NewSentPaymentRow, PeerRow,
        ProfileRow, ReceivedOfferRow, ReceivedPaymentRow, SentOfferRow,
        SentPaymentRow,
    },
    schema,
};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");

type SqlitePool = Pool<ConnectionManager<SqliteConnection>>;

#[derive(Clone)]
pub struct Store {
    pool: Arc<SqlitePool>,
}

impl Store {
    /// Open (creating if absent) the sqlite database at `database_url` and
    /// run any pending migrations.
    pub fn connect(database_url: &str) -> Result<Self, StoreError> {
        let manager = ConnectionManager::<SqliteConnection>::new(database_url);
        let pool = Pool::builder()
            .build(manager)
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        let mut conn = pool.get()?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let pool = Arc::clone(&self.pool);
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut conn)
        })
        .await
        .expect("store blocking task panicked")
    }

    // --- item --- //

    /// Insert an item. Returns `Ok(())` if the item already exists (an
    /// insert is idempotent by construction: `hash` is the primary key and
    /// re-inserting the same content never changes it).
    pub async fn insert_item(&self, item: &ContentItem) -> Result<(), StoreError> {
        let row = NewItemRow::try_from(item)?;
        self.with_conn(move |conn| {
            let result = diesel::insert_into(schema::item::table)
                .values(&row)
                .execute(conn);
            match result {
                Ok(_) => Ok(()),
                Err(e) if is_unique_violation(&e) => Ok(()),
                Err(e) => Err(StoreError::from(e)),
            }
        })
        .await
    }

    pub async fn get_item(&self, hash: Hash32) -> Result<Option<ContentItem>, StoreError> {
        let hex = hash_to_hex(hash);
        let row: Option<ItemRow> = self
            .with_conn(move |conn| {
                schema::item::table
                    .filter(schema::item::hash.eq(hex))
                    .first::<ItemRow>(conn)
                    .optional()
                    .map_err(StoreError::from)
            })
            .await?;
        row.map(ContentItem::try_from).transpose()
    }

    pub async fn item_exists(&self, hash: Hash32) -> Result<bool, StoreError> {
        Ok(self.get_item(hash).await?.is_some())
    }

    pub async fn set_item_key(
        &self,
        hash: Hash32,
        key: [u8; 32],
    ) -> Result<(), StoreError> {
        let hex = hash_to_hex(hash);
        let key_hex = hex::encode(key);
        self.with_conn(move |conn| {
            diesel::update(schema::item::table.filter(schema::item::hash.eq(hex)))
                .set(schema::item::decryption_key.eq(Some(key_hex)))
                .execute(conn)
                .map(|_| ())
                .map_err(StoreError::from)
        })
        .await
    }

    pub async fn set_item_liked(
        &self,
        hash: Hash32,
        liked_at: Option<Timestamp>,
    ) -> Result<(), StoreError> {
        let hex = hash_to_hex(hash);
        let naive = liked_at.map(timestamp_to_naive);
        self.with_conn(move |conn| {
            diesel::update(schema::item::table.filter(schema::item::hash.eq(hex)))
                .set(schema::item::liked_at.eq(naive))
                .execute(conn)
                .map(|_| ())
                .map_err(StoreError::from)
        })
        .await
    }

    /// Hashes of items authored by one of `addresses`, with
    /// `min_block <= block_height <= max_block` (used by `lookup_items` and
    /// the rate limiter's per-author window count).
    pub async fn items_by_authors_in_range(
        &self,
        addresses: Vec<Address>,
        min_block: i64,
        max_block: i64,
    ) -> Result<Vec<Hash32>, StoreError> {
        let addr_strs: Vec<String> =
            addresses.iter().map(|a| a.as_str().to_owned()).collect();
        let hashes: Vec<String> = self
            .with_conn(move |conn| {
                schema::item::table
                    .filter(schema::item::author_address.eq_any(addr_strs))
                    .filter(schema::item::block_height.ge(min_block))
                    .filter(schema::item::block_height.le(max_block))
                    .select(schema::item::hash)
                    .load(conn)
                    .map_err(StoreError::from)
            })
            .await?;
        hashes
            .iter()
            .map(|h| Hash32::from_hex(h).map_err(|e| StoreError::Decode(e.to_string())))
            .collect()
    }

    pub async fn count_items_by_author_in_range(
        &self,
        address: Address,
        min_block: i64,
        max_block: i64,
    ) -> Result<i64, StoreError> {
        let addr_str = address.as_str().to_owned();
        self.with_conn(move |conn| {
            schema::item::table
                .filter(schema::item::author_address.eq(addr_str))
                .filter(schema::item::block_height.ge(min_block))
                .filter(schema::item::block_height.le(max_block))
                .count()
                .get_result(conn)
                .map_err(StoreError::from)
        })
        .await
    }

    pub async fn delete_expired_items(&self, cutoff: Timestamp) -> Result<usize, StoreError> {
        let naive = timestamp_to_naive(cutoff);
        self.with_conn(move |conn| {
            diesel::delete(schema::item::table.filter(schema::item::created_at.lt(naive)))
                .execute(conn)
                .map_err(StoreError::from)
        })
        .await
    }

    // --- profile --- //

    pub async fn insert_profile(&self, new: NewProfileRow) -> Result<Profile, StoreError> {
        self.with_conn(move |conn| {
            conn.transaction(|conn| {
                diesel::insert_into(schema::profile::table)
                    .values(&new)
                    .execute(conn)?;
                schema::profile::table
                    .order(schema::profile::profile_id.desc())
                    .first::<ProfileRow>(conn)
            })
            .map_err(StoreError::from)
        })
        .await?
        .try_into()
    }

    pub async fn get_profile_by_name(&self, name: String) -> Result<Option<Profile>, StoreError> {
        let row: Option<ProfileRow> = self
            .with_conn(move |conn| {
                schema::profile::table
                    .filter(schema::profile::name.eq(name))
                    .first::<ProfileRow>(conn)
                    .optional()
                    .map_err(StoreError::from)
            })
            .await?;
        row.map(Profile::try_from).transpose()
    }

    pub async fn list_profiles(&self) -> Result<Vec<Profile>, StoreError> {
        let rows: Vec<ProfileRow> = self
            .with_conn(|conn| schema::profile::table.load(conn).map_err(StoreError::from))
            .await?;
        rows.into_iter().map(Profile::try_from).collect()
    }

    // --- peer --- //

    pub async fn insert_peer(&self, new: NewPeerRow) -> Result<Peer, StoreError> {
        self.with_conn(move |conn| {
            conn.transaction(|conn| {
                diesel::insert_into(schema::peer::table)
                    .values(&new)
                    .execute(conn)?;
                schema::peer::table
                    .order(schema::peer::peer_id.desc())
                    .first::<PeerRow>(conn)
            })
            .map_err(StoreError::from)
        })
        .await?
        .try_into()
    }

    pub async fn list_peers(&self) -> Result<Vec<Peer>, StoreError> {
        let rows: Vec<PeerRow> = self
            .with_conn(|conn| schema::peer::table.load(conn).map_err(StoreError::from))
            .await?;
        rows.into_iter().map(Peer::try_from).collect()
    }

    pub async fn downloading_peers(&self) -> Result<Vec<Peer>, StoreError> {
        let rows: Vec<PeerRow> = self
            .with_conn(|conn| {
                schema::peer::table
                    .filter(schema::peer::downloading.eq(true))
                    .load(conn)
                    .map_err(StoreError::from)
            })
            .await?;
        rows.into_iter().map(Peer::try_from).collect()
    }

    // --- sent_offer --- //

    pub async fn insert_sent_offer(&self, offer: &SentOffer) -> Result<SentOffer, StoreError> {
        let row = NewSentOfferRow::from(offer);
        let stored: SentOfferRow = self
            .with_conn(move |conn| {
                conn.transaction(|conn| {
                    diesel::insert_into(schema::sent_offer::table)
                        .values(&row)
                        .execute(conn)?;
                    schema::sent_offer::table
                        .order(schema::sent_offer::sent_offer_id.desc())
                        .first::<SentOfferRow>(conn)
                })
                .map_err(StoreError::from)
            })
            .await?;
        stored.try_into()
    }

    /// An unexpired SentOffer for `(item_hash, client_addr)`, if one exists
    /// — the cache-and-reuse lookup behind `get_buy_offer` (spec §4.5).
    pub async fn find_unexpired_sent_offer(
        &self,
        item_hash: Hash32,
        client_addr: PeerAddr,
        now_unix: i64,
        grace_s: i64,
    ) -> Result<Option<SentOffer>, StoreError> {
        let item_hex = hash_to_hex(item_hash);
        let (client_host, client_port) = crate::convert::addr_to_host_port(client_addr);
        let rows: Vec<SentOfferRow> = self
            .with_conn(move |conn| {
                schema::sent_offer::table
                    .filter(schema::sent_offer::item_hash.eq(item_hex))
                    .filter(schema::sent_offer::client_host.eq(client_host))
                    .filter(schema::sent_offer::client_port.eq(client_port))
                    .load(conn)
                    .map_err(StoreError::from)
            })
            .await?;
        for row in rows {
            let offer = SentOffer::try_from(row)?;
            if !offer.is_expired(now_unix, grace_s) {
                return Ok(Some(offer));
            }
        }
        Ok(None)
    }

    pub async fn get_sent_offer_by_payment_hash(
        &self,
        payment_hash: Hash32,
    ) -> Result<Option<SentOffer>, StoreError> {
        let hex = hash_to_hex(payment_hash);
        let row: Option<SentOfferRow> = self
            .with_conn(move |conn| {
                schema::sent_offer::table
                    .filter(schema::sent_offer::payment_hash.eq(hex))
                    .first::<SentOfferRow>(conn)
                    .optional()
                    .map_err(StoreError::from)
            })
            .await?;
        row.map(SentOffer::try_from).transpose()
    }

    pub async fn delete_expired_sent_offers(
        &self,
        now_unix: i64,
        retention_s: i64,
    ) -> Result<usize, StoreError> {
        self.with_conn(move |conn| {
            let rows: Vec<SentOfferRow> =
                schema::sent_offer::table.load(conn)?;
            let mut deleted = 0;
            for row in rows {
                let id = row.sent_offer_id;
                let expiry_cutoff = row.invoice_timestamp + row.invoice_expiry + retention_s;
                if now_unix > expiry_cutoff {
                    diesel::delete(
                        schema::sent_offer::table
                            .filter(schema::sent_offer::sent_offer_id.eq(id)),
                    )
                    .execute(conn)?;
                    deleted += 1;
                }
            }
            Ok(deleted)
        })
        .await
    }

    // --- received_offer --- //

    pub async fn insert_received_offer(
        &self,
        offer: &ReceivedOffer,
    ) -> Result<(), StoreError> {
        let row = NewReceivedOfferRow::from(offer);
        self.with_conn(move |conn| {
            let result = diesel::insert_into(schema::received_offer::table)
                .values(&row)
                .execute(conn);
            match result {
                Ok(_) => Ok(()),
                Err(e) if is_unique_violation(&e) => Ok(()),
                Err(e) => Err(StoreError::from(e)),
            }
        })
        .await
    }

    pub async fn get_received_offer(
        &self,
        received_offer_id: i64,
    ) -> Result<Option<ReceivedOffer>, StoreError> {
        let row: Option<ReceivedOfferRow> = self
            .with_conn(move |conn| {
                schema::received_offer::table
                    .filter(schema::received_offer::received_offer_id.eq(received_offer_id))
                    .first::<ReceivedOfferRow>(conn)
                    .optional()
                    .map_err(StoreError::from)
            })
            .await?;
        row.map(ReceivedOffer::try_from).transpose()
    }

    pub async fn delete_expired_received_offers(
        &self,
        now_unix: i64,
        grace_s: i64,
    ) -> Result<usize, StoreError> {
        self.with_conn(move |conn| {
            let rows: Vec<ReceivedOfferRow> =
                schema::received_offer::table.load(conn)?;
            let mut deleted = 0;
            for row in rows {
                let id = row.received_offer_id;
                let expiry_cutoff = row.invoice_timestamp + row.invoice_expiry + grace_s;
                if now_unix > expiry_cutoff {
                    diesel::delete(
                        schema::received_offer::table
                            .filter(schema::received_offer::received_offer_id.eq(id)),
                    )
                    .execute(conn)?;
                    deleted += 1;
                }
            }
            Ok(deleted)
        })
        .await
    }

    // --- sent_payment --- //

    /// Persist the outcome of a buyer's payment in one transaction: the
    /// `SentPayment` row, and — only if the preimage actually validated —
    /// marking the `ReceivedOffer` paid and installing the decryption key
    /// on the item. These three writes must be consistent (spec §5); a
    /// crash between them must never leave an offer marked paid without
    /// the key installed, or vice versa.
    pub async fn finalize_sent_payment(
        &self,
        payment: &SentPayment,
        item_hash: Hash32,
    ) -> Result<(), StoreError> {
        let row = NewSentPaymentRow::from(payment);
        let payment_hash_hex = hash_to_hex(payment.payment_hash);
        let item_hex = hash_to_hex(item_hash);
        let valid = payment.valid;
        let key_hex = hex::encode(payment.secret_key);
        self.with_conn(move |conn| {
            conn.transaction(|conn| {
                match diesel::insert_into(schema::sent_payment::table)
                    .values(&row)
                    .execute(conn)
                {
                    Ok(_) => {}
                    Err(e) if is_unique_violation(&e) => {}
                    Err(e) => return Err(e),
                }
                if valid {
                    diesel::update(
                        schema::received_offer::table
                            .filter(schema::received_offer::payment_hash.eq(payment_hash_hex)),
                    )
                    .set(schema::received_offer::paid.eq(true))
                    .execute(conn)?;
                    diesel::update(schema::item::table.filter(schema::item::hash.eq(item_hex)))
                        .set(schema::item::decryption_key.eq(Some(key_hex)))
                        .execute(conn)?;
                }
                Ok(())
            })
            .map_err(StoreError::from)
        })
        .await
    }

    // --- received_payment --- //

    /// Mark the matching `SentOffer` paid and record the settlement in one
    /// transaction (spec §5). Returns `false` without touching `SentOffer`
    /// if this settlement was already recorded (idempotent replay, spec
    /// §4.4).
    pub async fn finalize_received_payment(
        &self,
        payment: &ReceivedPayment,
    ) -> Result<bool, StoreError> {
        let row = NewReceivedPaymentRow::from(payment);
        let payment_hash_hex = hash_to_hex(payment.payment_hash);
        self.with_conn(move |conn| {
            conn.transaction(|conn| {
                let inserted = match diesel::insert_into(schema::received_payment::table)
                    .values(&row)
                    .execute(conn)
                {
                    Ok(_) => true,
                    Err(e) if is_unique_violation(&e) => false,
                    Err(e) => return Err(e),
                };
                if inserted {
                    diesel::update(
                        schema::sent_offer::table
                            .filter(schema::sent_offer::payment_hash.eq(payment_hash_hex)),
                    )
                    .set(schema::sent_offer::paid.eq(true))
                    .execute(conn)?;
                }
                Ok(inserted)
            })
            .map_err(StoreError::from)
        })
        .await
    }

    /// `max(settle_index)` across all received payments, or `None` if there
    /// are none yet. PaymentEngine's subscription loop resumes from here.
    pub async fn latest_received_payment_index(&self) -> Result<Option<i64>, StoreError> {
        self.with_conn(|conn| {
            schema::received_payment::table
                .select(diesel::dsl::max(schema::received_payment::settle_index))
                .first::<Option<i64>>(conn)
                .map_err(StoreError::from)
        })
        .await
    }

    pub async fn list_received_payments(&self) -> Result<Vec<ReceivedPayment>, StoreError> {
        let rows: Vec<ReceivedPaymentRow> = self
            .with_conn(|conn| {
                schema::received_payment::table
                    .load(conn)
                    .map_err(StoreError::from)
            })
            .await?;
        rows.into_iter().map(ReceivedPayment::try_from).collect()
    }
}

fn is_unique_violation(err: &diesel::result::Error) -> bool {
    matches!(
        err,
        diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            _,
        )
    )
}

#[cfg(test)]
mod test {
    use squeak_crypto::ContentCrypto;

    use super::*;

    fn temp_store() -> Store {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.sqlite3");
        // leak the tempdir so the file outlives this function
        std::mem::forget(dir);
        Store::connect(path.to_str().unwrap()).unwrap()
    }

    fn sample_item() -> ContentItem {
        let crypto = ContentCrypto::new(bitcoin::Network::Regtest);
        let author = squeak_crypto::KeyPair::generate(bitcoin::Network::Regtest);
        crypto
            .make_item(
                &author,
                "hello store",
                Hash32::new([0u8; 32]),
                100,
                1_700_000_000,
                squeak_crypto::item::BlockHeader(vec![9, 9, 9]),
            )
            .unwrap()
    }

    #[tokio::test]
    async fn insert_then_get_item_roundtrips() {
        let store = temp_store();
        let item = sample_item();
        store.insert_item(&item).await.unwrap();

        let fetched = store.get_item(item.hash).await.unwrap().unwrap();
        assert_eq!(fetched.hash, item.hash);
        assert_eq!(fetched.ciphertext, item.ciphertext);
        assert_eq!(fetched.decryption_key, item.decryption_key);
    }

    #[tokio::test]
    async fn reinserting_same_item_is_idempotent() {
        let store = temp_store();
        let item = sample_item();
        store.insert_item(&item).await.unwrap();
        store.insert_item(&item).await.unwrap();

        let count = store
            .items_by_authors_in_range(vec![item.author_address.clone()], 0, 1_000_000)
            .await
            .unwrap()
            .len();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn latest_received_payment_index_is_none_when_empty() {
        let store = temp_store();
        assert_eq!(store.latest_received_payment_index().await.unwrap(), None);
    }

    #[tokio::test]
    async fn received_payment_replay_is_a_noop() {
        let store = temp_store();
        let payment = ReceivedPayment {
            received_payment_id: 0,
            created_at: Timestamp::now(),
            item_hash: Hash32::digest(b"item"),
            payment_hash: Hash32::digest(b"payment"),
            price_msat: MilliSats::from_sats(1),
            settle_index: 5,
            client_addr: "127.0.0.1:9000".parse().unwrap(),
        };
        assert!(store.finalize_received_payment(&payment).await.unwrap());
        assert!(!store.finalize_received_payment(&payment).await.unwrap());
        assert_eq!(store.latest_received_payment_index().await.unwrap(), Some(5));
    }
}
