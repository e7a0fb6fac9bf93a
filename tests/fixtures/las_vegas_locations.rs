//! Real Las Vegas / Henderson locations for realistic test fixtures.
//!
//! Coordinates sourced from OpenStreetMap. They are routable with the OSRM
//! Nevada extract.

/// A named location with coordinates.
#[derive(Debug, Clone)]
pub struct NamedLocation {
    pub name: &'static str,
    pub lat: f64,
    pub lng: f64,
}

impl NamedLocation {
    pub const fn new(name: &'static str, lat: f64, lng: f64) -> Self {
        Self { name, lat, lng }
    }

    pub fn coords(&self) -> (f64, f64) {
        (self.lat, self.lng)
    }
}

/// Large venues used as facility sites.
pub const DEPOTS: &[NamedLocation] = &[
    NamedLocation::new("Wynn Las Vegas", 36.1263781, -115.1658180),
    NamedLocation::new("MGM Grand", 36.1023654, -115.1688720),
    NamedLocation::new("Longhorn Casino", 36.1070664, -115.0591256),
];

/// Strip-area addresses used as demand points.
pub const STRIP_POINTS: &[NamedLocation] = &[
    NamedLocation::new("Hard Rock Cafe", 36.1041592, -115.1722166),
    NamedLocation::new("SW Steakhouse", 36.1262145, -115.1669146),
    NamedLocation::new("Sinatra", 36.1300035, -115.1654850),
    NamedLocation::new("Public House", 36.1219193, -115.1689317),
    NamedLocation::new("Brooklyn Bowl", 36.1175388, -115.1695094),
    NamedLocation::new("Gordon Ramsay BurGR", 36.1107195, -115.1720818),
    NamedLocation::new("Spago by Wolfgang Puck", 36.1139368, -115.1741462),
    NamedLocation::new("Hash House A Go Go", 36.1181377, -115.1710989),
];
