//! Weighted random suggestions drawn from lists
//!
//! Items that were used recently are held back for a cooldown period. The
//! remaining items are drawn one at a time with probability proportional to
//! their weight, without replacement.

use std::sync::Arc;

use rand::Rng;

use crate::clock::Clock;
use crate::db::{ItemRepository, MenuCandidate, SharedDatabase};
use crate::error::{Error, Result};
use crate::models::{ListId, MenuItem, MenuOptions};
use crate::util::days_to_millis;

/// Reads eligible items and draws menus from them; never writes
#[derive(Clone)]
pub struct MenuGenerator {
    db: SharedDatabase,
    clock: Arc<dyn Clock>,
}

impl MenuGenerator {
    pub fn new(db: SharedDatabase, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Draw a menu using the thread-local RNG
    pub async fn generate(&self, list_ids: &[ListId], options: MenuOptions) -> Result<Vec<MenuItem>> {
        let candidates = self.candidates(list_ids, options).await?;
        let mut rng = rand::thread_rng();
        Ok(draw(candidates, options.max_items, &mut rng))
    }

    /// Draw a menu with a caller-supplied RNG (seeded in tests)
    pub async fn generate_with_rng<R: Rng + ?Sized>(
        &self,
        list_ids: &[ListId],
        options: MenuOptions,
        rng: &mut R,
    ) -> Result<Vec<MenuItem>> {
        let candidates = self.candidates(list_ids, options).await?;
        Ok(draw(candidates, options.max_items, rng))
    }

    async fn candidates(
        &self,
        list_ids: &[ListId],
        options: MenuOptions,
    ) -> Result<Vec<MenuCandidate>> {
        validate(options)?;
        if list_ids.is_empty() {
            return Ok(Vec::new());
        }

        let cutoff = self
            .clock
            .now_millis()
            .saturating_sub(days_to_millis(options.cooldown_days));
        let db = self.db.lock().await?;
        ItemRepository::new(db.connection()).menu_candidates(list_ids, cutoff)
    }
}

fn validate(options: MenuOptions) -> Result<()> {
    if options.max_items == 0 {
        return Err(Error::InvalidInput(
            "max_items must be at least 1".to_string(),
        ));
    }
    if options.cooldown_days < 0 {
        return Err(Error::InvalidInput(format!(
            "cooldown_days cannot be negative (got {})",
            options.cooldown_days
        )));
    }
    Ok(())
}

/// Weighted sampling without replacement; zero-weight candidates never win
pub(crate) fn draw<R: Rng + ?Sized>(
    candidates: Vec<MenuCandidate>,
    max_items: usize,
    rng: &mut R,
) -> Vec<MenuItem> {
    let mut pool: Vec<(MenuCandidate, u64)> = candidates
        .into_iter()
        .map(|candidate| {
            let weight = u64::from(candidate.weight());
            (candidate, weight)
        })
        .filter(|(_, weight)| *weight > 0)
        .collect();
    let mut total: u64 = pool.iter().map(|(_, weight)| weight).sum();
    let mut picks = Vec::with_capacity(max_items.min(pool.len()));

    while picks.len() < max_items && total > 0 {
        let mut target = rng.gen_range(0..total);
        let index = pool
            .iter()
            .position(|(_, weight)| {
                if target < *weight {
                    true
                } else {
                    target -= weight;
                    false
                }
            })
            .unwrap_or(pool.len() - 1);

        let (candidate, weight) = pool.swap_remove(index);
        total -= weight;
        picks.push(MenuItem {
            item_id: candidate.item.id,
            list_id: candidate.item.list_id,
            weight: candidate.weight(),
            name: candidate.item.name,
            last_used_at: candidate.item.last_used_at,
        });
    }

    picks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::db::{Database, ListRepository, DEFAULT_STORAGE_TIMEOUT};
    use crate::models::{ItemId, ListItem, NewItem, NewList, UserId};
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    const DAY: i64 = 24 * 60 * 60 * 1000;
    const NOW: i64 = 1_000 * DAY;

    fn candidate(name: &str, weight: Option<u32>, list_default: u32) -> MenuCandidate {
        MenuCandidate {
            item: ListItem {
                id: ItemId::new(),
                list_id: ListId::new(),
                name: name.to_string(),
                description: None,
                weight,
                last_used_at: None,
                metadata: serde_json::json!({}),
                external_id: None,
                created_at: 0,
                updated_at: 0,
                deleted_at: None,
            },
            list_default_weight: list_default,
        }
    }

    async fn setup(names: &[&str]) -> (MenuGenerator, SharedDatabase, ListId) {
        let db = SharedDatabase::new(Database::open_in_memory().unwrap(), DEFAULT_STORAGE_TIMEOUT);
        let list_id = {
            let guard = db.lock().await.unwrap();
            let conn = guard.connection();
            let (list, _) = ListRepository::new(conn)
                .create_with_owner(NewList::new("Dinner"), &UserId::new(), 0)
                .unwrap();
            let items = ItemRepository::new(conn);
            for name in names {
                items.add(&list.id, NewItem::new(*name), 0).unwrap();
            }
            list.id
        };
        let generator = MenuGenerator::new(db.clone(), Arc::new(ManualClock::new(NOW)));
        (generator, db, list_id)
    }

    #[test]
    fn draw_never_picks_zero_weight() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let picks = draw(
                vec![candidate("never", Some(0), 1), candidate("always", None, 1)],
                2,
                &mut rng,
            );
            assert_eq!(picks.len(), 1);
            assert_eq!(picks[0].name, "always");
        }
    }

    #[test]
    fn draw_favours_heavier_items() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut heavy_wins = 0;
        for _ in 0..1_000 {
            let picks = draw(
                vec![candidate("light", Some(1), 1), candidate("heavy", Some(99), 1)],
                1,
                &mut rng,
            );
            if picks[0].name == "heavy" {
                heavy_wins += 1;
            }
        }
        assert!(heavy_wins > 900, "heavy item won {heavy_wins} of 1000 draws");
    }

    #[test]
    fn draw_uses_list_default_weight() {
        let mut rng = StdRng::seed_from_u64(1);
        let picks = draw(vec![candidate("plain", None, 4)], 3, &mut rng);
        assert_eq!(picks.len(), 1);
        assert_eq!(picks[0].weight, 4);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn picks_are_distinct_and_bounded() {
        let names = ["a", "b", "c", "d", "e", "f", "g", "h", "i", "j"];
        let (generator, _, list_id) = setup(&names).await;
        let options = MenuOptions {
            cooldown_days: 90,
            max_items: 3,
        };

        let mut rng = StdRng::seed_from_u64(3);
        let menu = generator
            .generate_with_rng(&[list_id], options, &mut rng)
            .await
            .unwrap();
        assert_eq!(menu.len(), 3);
        let distinct: HashSet<_> = menu.iter().map(|pick| pick.item_id).collect();
        assert_eq!(distinct.len(), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn seeded_rng_is_deterministic() {
        let (generator, _, list_id) = setup(&["a", "b", "c", "d", "e"]).await;
        let options = MenuOptions {
            cooldown_days: 90,
            max_items: 3,
        };

        let first = generator
            .generate_with_rng(&[list_id], options, &mut StdRng::seed_from_u64(9))
            .await
            .unwrap();
        let second = generator
            .generate_with_rng(&[list_id], options, &mut StdRng::seed_from_u64(9))
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cooldown_excludes_recently_used_items() {
        let (generator, db, list_id) = setup(&["recent", "old", "never"]).await;
        {
            let guard = db.lock().await.unwrap();
            let items = ItemRepository::new(guard.connection());
            for item in items.list(&list_id).unwrap() {
                match item.name.as_str() {
                    "recent" => {
                        items.mark_used(&item.id, NOW - 10 * DAY, NOW).unwrap();
                    }
                    "old" => {
                        items.mark_used(&item.id, NOW - 120 * DAY, NOW).unwrap();
                    }
                    _ => {}
                }
            }
        }

        let menu = generator
            .generate(
                &[list_id],
                MenuOptions {
                    cooldown_days: 90,
                    max_items: 10,
                },
            )
            .await
            .unwrap();
        let mut names: Vec<_> = menu.into_iter().map(|pick| pick.name).collect();
        names.sort();
        assert_eq!(names, vec!["never", "old"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_pool_gives_empty_menu() {
        let (generator, _, list_id) = setup(&[]).await;
        let menu = generator
            .generate(&[list_id], MenuOptions::default())
            .await
            .unwrap();
        assert!(menu.is_empty());
        assert!(generator
            .generate(&[], MenuOptions::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rejects_invalid_options() {
        let (generator, _, list_id) = setup(&["a"]).await;
        let zero = generator
            .generate(
                &[list_id],
                MenuOptions {
                    cooldown_days: 90,
                    max_items: 0,
                },
            )
            .await;
        assert!(matches!(zero, Err(Error::InvalidInput(_))));

        let negative = generator
            .generate(
                &[list_id],
                MenuOptions {
                    cooldown_days: -1,
                    max_items: 3,
                },
            )
            .await;
        assert!(matches!(negative, Err(Error::InvalidInput(_))));
    }
}
