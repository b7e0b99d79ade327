//! Static reservation table.
//!
//! Covers the well-known system band, IANA-registered bands that collide
//! with dev traffic in practice, and single ports that frameworks and
//! infrastructure grab by default. The table is a heuristic guard against
//! foot-guns, not an authoritative IANA mirror.

/// Inclusive band with a label.
struct ReservedBand {
    start: u16,
    end: u16,
    label: &'static str,
}

const RESERVED_BANDS: &[ReservedBand] = &[
    ReservedBand {
        start: 0,
        end: 1023,
        label: "well-known system ports",
    },
    ReservedBand {
        start: 6000,
        end: 6063,
        label: "X11 display servers",
    },
];

const RESERVED_PORTS: &[(u16, &str)] = &[
    (1433, "Microsoft SQL Server"),
    (2375, "Docker daemon (plain)"),
    (2376, "Docker daemon (TLS)"),
    (3000, "Node.js / Rails dev server"),
    (3306, "MySQL"),
    (4200, "Angular dev server"),
    (5000, "Flask / AirPlay"),
    (5173, "Vite dev server"),
    (5432, "PostgreSQL"),
    (5672, "RabbitMQ"),
    (6379, "Redis"),
    (8000, "Django dev server"),
    (8080, "HTTP alternate"),
    (8443, "HTTPS alternate"),
    (9090, "Prometheus"),
    (9200, "Elasticsearch"),
    (11211, "Memcached"),
    (15672, "RabbitMQ management"),
    (27017, "MongoDB"),
];

/// Returns the reservation label if `port` is reserved.
pub fn reservation(port: u16) -> Option<&'static str> {
    for band in RESERVED_BANDS {
        if band.start <= port && port <= band.end {
            return Some(band.label);
        }
    }
    RESERVED_PORTS
        .iter()
        .find(|(p, _)| *p == port)
        .map(|(_, label)| *label)
}

pub fn is_reserved(port: u16) -> bool {
    reservation(port).is_some()
}
