//! Per-author, per-block-window admission control (spec §4.2).

use squeak_crypto::Address;
use squeak_store::{Store, StoreError};

/// Admits item `i` iff fewer than `count` items authored by `i.author_address`
/// already exist in block range `[i.block_height - window_blocks, i.block_height]`.
#[derive(Copy, Clone, Debug)]
pub struct RateLimiter {
    pub count: u32,
    pub window_blocks: u32,
}

impl RateLimiter {
    pub fn new(count: u32, window_blocks: u32) -> Self {
        Self {
            count,
            window_blocks,
        }
    }

    pub async fn admit(
        &self,
        store: &Store,
        author_address: Address,
        block_height: i64,
    ) -> Result<bool, StoreError> {
        let min_block = block_height - i64::from(self.window_blocks);
        let existing = store
            .count_items_by_author_in_range(author_address, min_block, block_height)
            .await?;
        Ok(existing < i64::from(self.count))
    }
}

#[cfg(test)]
mod test {
    use bitcoin::Network;
    use squeak_crypto::{ContentCrypto, KeyPair};
    use squeak_common::Hash32;

    use super::*;

    fn temp_store() -> Store {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rl.sqlite3");
        std::mem::forget(dir);
        Store::connect(path.to_str().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn admits_until_count_reached_then_rejects() {
        let store = temp_store();
        let crypto = ContentCrypto::new(Network::Regtest);
        let author = KeyPair::generate(Network::Regtest);
        let limiter = RateLimiter::new(2, 10);

        for height in [100, 101, 102] {
            let admitted = limiter
                .admit(&store, author.address.clone(), height)
                .await
                .unwrap();
            if height < 102 {
                assert!(admitted, "height {height} should be admitted");
                let item = crypto
                    .make_item(
                        &author,
                        "x",
                        Hash32::new([0u8; 32]),
                        height,
                        1_700_000_000,
                        squeak_crypto::item::BlockHeader(vec![]),
                    )
                    .unwrap();
                store.insert_item(&item).await.unwrap();
            } else {
                assert!(!admitted, "third item should be rejected");
            }
        }
    }

    proptest::proptest! {
        /// Testable property (spec §8): "Rate limiter admits at most `N`
        /// items per author per `W`-block window" — checked here for
        /// arbitrary `(N, W)` and an arbitrary non-decreasing sequence of
        /// block heights fed through `admit` one at a time, exactly as the
        /// `Controller` would.
        #[test]
        fn never_admits_more_than_count_per_window(
            count in 1u32..5,
            window_blocks in 0u32..20,
            deltas in proptest::collection::vec(0i64..5, 0..30),
        ) {
            // `Store::with_conn` dispatches through `tokio::task::spawn_blocking`,
            // which needs a live Tokio runtime context — `futures::executor::block_on`
            // doesn't provide one (unlike `#[tokio::test]`, used by the sibling
            // test above), so this proptest builds a real one to drive the
            // `async` body against.
            tokio::runtime::Runtime::new().unwrap().block_on(async {
                let store = temp_store();
                let crypto = ContentCrypto::new(Network::Regtest);
                let author = KeyPair::generate(Network::Regtest);
                let limiter = RateLimiter::new(count, window_blocks);

                let mut height = 1_000i64;
                for delta in deltas {
                    height += delta;
                    let admitted = limiter
                        .admit(&store, author.address.clone(), height)
                        .await
                        .unwrap();
                    if admitted {
                        let item = crypto
                            .make_item(
                                &author,
                                "x",
                                Hash32::new([0u8; 32]),
                                height,
                                1_700_000_000,
                                squeak_crypto::item::BlockHeader(vec![]),
                            )
                            .unwrap();
                        store.insert_item(&item).await.unwrap();
                    }

                    let min_block = height - i64::from(window_blocks);
                    let in_window = store
                        .count_items_by_author_in_range(author.address.clone(), min_block, height)
                        .await
                        .unwrap();
                    assert!(in_window <= i64::from(count));
                }
            });
        }
    }
}
