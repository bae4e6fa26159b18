use std::cmp::Ordering;

use async_trait::async_trait;
use diesel::prelude::*;

use kindred_shared::clients::db::DbPool;

use crate::matching::date_plan::{haversine_km, TargetLocation};
use crate::models::VenueSuggestion;
use crate::ports::VenueDirectory;
use crate::schema::venues;

/// Candidates considered per lookup before ranking.
const CANDIDATE_LIMIT: i64 = 200;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = venues)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct VenueRow {
    external_id: String,
    name: String,
    address: String,
    description: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    rating: Option<f32>,
}

impl From<VenueRow> for VenueSuggestion {
    fn from(row: VenueRow) -> Self {
        Self {
            name: row.name,
            address: row.address,
            place_id: row.external_id,
            description: row.description,
            rating: row.rating,
        }
    }
}

/// Active venues in the target city, nearest first when coordinates are
/// known, then best rated.
pub struct PgVenueDirectory {
    pool: DbPool,
}

impl PgVenueDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn distance(row: &VenueRow, origin: Option<(f64, f64)>) -> f64 {
    match (origin, row.latitude.zip(row.longitude)) {
        (Some((lat, lon)), Some((v_lat, v_lon))) => haversine_km(lat, lon, v_lat, v_lon),
        (Some(_), None) => f64::INFINITY,
        (None, _) => 0.0,
    }
}

fn pick_best(rows: Vec<VenueRow>, origin: Option<(f64, f64)>) -> Option<VenueRow> {
    rows.into_iter().min_by(|a, b| {
        distance(a, origin)
            .total_cmp(&distance(b, origin))
            .then_with(|| {
                b.rating
                    .unwrap_or(0.0)
                    .partial_cmp(&a.rating.unwrap_or(0.0))
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.external_id.cmp(&b.external_id))
    })
}

#[async_trait]
impl VenueDirectory for PgVenueDirectory {
    async fn suggest(&self, location: &TargetLocation) -> anyhow::Result<Option<VenueSuggestion>> {
        let Some(city) = location.city.clone() else {
            return Ok(None);
        };
        let origin = location.coordinates;
        let pool = self.pool.clone();

        let rows = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<VenueRow>> {
            let mut conn = pool.get()?;
            Ok(venues::table
                .filter(venues::is_active.eq(true))
                .filter(venues::city.ilike(city.trim()))
                .select(VenueRow::as_select())
                .limit(CANDIDATE_LIMIT)
                .load(&mut conn)?)
        })
        .await??;

        Ok(pick_best(rows, origin).map(VenueSuggestion::from))
    }
}
