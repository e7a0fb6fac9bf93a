//! OSRM HTTP adapter for closest-facility solves.
//!
//! Uses the `table` service with facilities and points as separate sources
//! and destinations. OSRM has no point barriers, so this adapter only backs
//! capacity-mode partitions.

use serde::{Deserialize, Serialize};

use crate::error::RoutingError;
use crate::traits::{ClosestFacilitySolver, CostQuery, Id, Location, Stop, TravelDirection, TravelMode};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OsrmConfig {
    pub base_url: String,
    pub profile: String,
    pub timeout_secs: u64,
}

impl Default for OsrmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            profile: "car".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OsrmClient {
    config: OsrmConfig,
    client: reqwest::blocking::Client,
}

impl OsrmClient {
    pub fn new(config: OsrmConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    fn table_url(&self, sources: &[Location], destinations: &[Location], mode: TravelMode) -> String {
        let coords = sources
            .iter()
            .chain(destinations)
            .map(|(lat, lng)| format!("{:.6},{:.6}", lng, lat))
            .collect::<Vec<_>>()
            .join(";");
        let source_ids = index_list(0..sources.len());
        let destination_ids = index_list(sources.len()..sources.len() + destinations.len());
        let annotation = match mode {
            TravelMode::Time => "duration",
            TravelMode::Distance => "distance",
        };

        format!(
            "{}/table/v1/{}/{}?sources={}&destinations={}&annotations={}",
            self.config.base_url, self.config.profile, coords, source_ids, destination_ids, annotation
        )
    }
}

impl ClosestFacilitySolver for OsrmClient {
    fn ensure_available(&self) -> Result<(), RoutingError> {
        let url = format!("{}/nearest/v1/{}/0,0", self.config.base_url, self.config.profile);
        // Any HTTP answer means the server is up; OSRM rejects far-off
        // coordinates with a 400.
        self.client.get(url).send().map(|_| ()).map_err(|err| {
            RoutingError::Unavailable(format!("OSRM at {} is unreachable: {}", self.config.base_url, err))
        })
    }

    fn solve_closest<F: Id, P: Id>(
        &self,
        facilities: &[Stop<F>],
        points: &[Stop<P>],
        query: &CostQuery,
        k: usize,
    ) -> Result<Vec<Vec<(f64, F)>>, RoutingError> {
        if points.is_empty() {
            return Ok(Vec::new());
        }
        if facilities.is_empty() || k == 0 {
            return Ok(vec![Vec::new(); points.len()]);
        }

        let facility_locations: Vec<Location> = facilities.iter().map(|f| f.location).collect();
        let point_locations: Vec<Location> = points.iter().map(|p| p.location).collect();
        let from_facilities = query.direction == TravelDirection::FromFacilities;
        let url = if from_facilities {
            self.table_url(&facility_locations, &point_locations, query.mode)
        } else {
            self.table_url(&point_locations, &facility_locations, query.mode)
        };

        let body = self
            .client
            .get(url)
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.json::<OsrmTableResponse>())?;
        if body.code != "Ok" {
            return Err(RoutingError::InvalidResponse(format!("OSRM table returned {}", body.code)));
        }

        let table = match query.mode {
            TravelMode::Time => body.durations,
            TravelMode::Distance => body.distances,
        }
        .ok_or_else(|| RoutingError::InvalidResponse("table is missing the requested annotation".to_string()))?;

        let cell = |facility: usize, point: usize| -> Option<f64> {
            let (row, column) = if from_facilities { (facility, point) } else { (point, facility) };
            table.get(row).and_then(|r| r.get(column)).copied().flatten()
        };

        Ok((0..points.len())
            .map(|point| {
                let mut row: Vec<(f64, F)> = facilities
                    .iter()
                    .enumerate()
                    .filter_map(|(i, facility)| cell(i, point).map(|cost| (cost, facility.id.clone())))
                    .collect();
                row.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
                row.truncate(k);
                row
            })
            .collect())
    }
}

fn index_list(range: std::ops::Range<usize>) -> String {
    range.map(|i| i.to_string()).collect::<Vec<_>>().join(";")
}

#[derive(Debug, Deserialize)]
struct OsrmTableResponse {
    code: String,
    durations: Option<Vec<Vec<Option<f64>>>>,
    distances: Option<Vec<Vec<Option<f64>>>>,
}
