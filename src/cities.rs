//! Static reference data for the monitored cities.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct City {
    pub name: &'static str,
    pub latitude: f64,
    pub longitude: f64,
    /// Short code used in historical dataset filenames (`{code}-temp-rains.csv`)
    pub code: &'static str,
}

pub const CITIES: &[City] = &[
    City { name: "Delhi", latitude: 28.6139, longitude: 77.2090, code: "delhi" },
    City { name: "Mumbai", latitude: 19.0760, longitude: 72.8777, code: "mumbai" },
    City { name: "Chennai", latitude: 13.0827, longitude: 80.2707, code: "chennai" },
    City { name: "Bangalore", latitude: 12.9716, longitude: 77.5946, code: "bengaluru" },
    City { name: "Kolkata", latitude: 22.5726, longitude: 88.3639, code: "kolkata" },
    City { name: "Pune", latitude: 18.5204, longitude: 73.8567, code: "pune" },
    City { name: "Hyderabad", latitude: 17.3850, longitude: 78.4867, code: "hyd" },
    City { name: "Ahmedabad", latitude: 23.0225, longitude: 72.5714, code: "amd" },
    City { name: "Coimbatore", latitude: 11.0168, longitude: 76.9558, code: "coimbatore" },
    City { name: "Madurai", latitude: 9.9252, longitude: 78.1198, code: "madurai" },
    City { name: "Visakhapatnam", latitude: 17.6868, longitude: 83.2185, code: "visakhapatnam" },
    City { name: "Vijayawada", latitude: 16.5062, longitude: 80.6480, code: "vijayawada" },
];

/// Look up a city by display name or dataset code, ignoring case
pub fn find(name_or_code: &str) -> Option<&'static City> {
    let needle = name_or_code.trim();
    CITIES
        .iter()
        .find(|c| c.name.eq_ignore_ascii_case(needle) || c.code.eq_ignore_ascii_case(needle))
}

/// Long-run monthly climate means, January first.
#[derive(Debug, Clone, Copy)]
pub struct MonthlyNormals {
    pub temp_max: [f64; 12],
    pub temp_min: [f64; 12],
    pub rain: [f64; 12],
}

impl MonthlyNormals {
    /// Values for a 1-based calendar month
    pub fn for_month(&self, month: u32) -> Option<(f64, f64, f64)> {
        let idx = month.checked_sub(1)? as usize;
        Some((
            *self.temp_max.get(idx)?,
            *self.temp_min.get(idx)?,
            *self.rain.get(idx)?,
        ))
    }
}

pub fn normals(city: &str) -> Option<MonthlyNormals> {
    let city = find(city)?;
    let n = match city.name {
        "Delhi" => MonthlyNormals {
            temp_max: [21., 24., 30., 36., 40., 38., 34., 33., 33., 34., 29., 23.],
            temp_min: [7., 10., 15., 21., 25., 28., 27., 26., 25., 21., 14., 9.],
            rain: [24., 18., 18., 9., 13., 66., 211., 247., 130., 31., 3., 11.],
        },
        "Mumbai" => MonthlyNormals {
            temp_max: [31., 31., 32., 33., 33., 32., 30., 29., 30., 32., 33., 32.],
            temp_min: [18., 19., 21., 24., 26., 26., 25., 25., 25., 24., 22., 19.],
            rain: [1., 1., 1., 1., 18., 498., 868., 554., 341., 125., 12., 3.],
        },
        "Chennai" => MonthlyNormals {
            temp_max: [29., 31., 33., 35., 37., 38., 37., 36., 35., 32., 29., 29.],
            temp_min: [21., 22., 24., 26., 28., 29., 28., 27., 26., 25., 23., 22.],
            rain: [25., 12., 19., 29., 51., 53., 56., 84., 120., 267., 351., 141.],
        },
        "Bangalore" => MonthlyNormals {
            temp_max: [27., 29., 32., 33., 33., 30., 28., 28., 28., 28., 27., 26.],
            temp_min: [15., 16., 19., 21., 22., 21., 20., 20., 20., 20., 18., 16.],
            rain: [3., 6., 12., 39., 113., 110., 88., 122., 144., 194., 51., 19.],
        },
        "Kolkata" => MonthlyNormals {
            temp_max: [27., 29., 34., 36., 36., 34., 32., 32., 32., 33., 31., 27.],
            temp_min: [14., 16., 21., 25., 26., 27., 27., 27., 26., 25., 20., 15.],
            rain: [13., 22., 33., 44., 120., 297., 326., 328., 252., 185., 28., 9.],
        },
        "Pune" => MonthlyNormals {
            temp_max: [30., 32., 35., 38., 38., 33., 30., 29., 29., 32., 33., 31.],
            temp_min: [12., 14., 17., 20., 23., 23., 22., 22., 22., 20., 16., 13.],
            rain: [2., 2., 3., 13., 39., 114., 187., 123., 91., 65., 19., 5.],
        },
        "Hyderabad" => MonthlyNormals {
            temp_max: [29., 32., 35., 38., 39., 35., 31., 30., 31., 31., 31., 29.],
            temp_min: [15., 17., 20., 24., 26., 25., 23., 23., 23., 22., 19., 16.],
            rain: [5., 8., 14., 28., 52., 109., 164., 148., 133., 115., 28., 10.],
        },
        "Ahmedabad" => MonthlyNormals {
            temp_max: [29., 31., 36., 40., 42., 39., 33., 31., 32., 36., 34., 31.],
            temp_min: [13., 15., 19., 23., 27., 27., 26., 26., 25., 24., 19., 14.],
            rain: [2., 2., 2., 4., 9., 92., 214., 285., 137., 39., 7., 3.],
        },
        _ => return None,
    };
    Some(n)
}

pub const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_by_name_and_code() {
        assert_eq!(find("delhi").map(|c| c.name), Some("Delhi"));
        assert_eq!(find("bengaluru").map(|c| c.name), Some("Bangalore"));
        assert_eq!(find("  HYD ").map(|c| c.name), Some("Hyderabad"));
        assert!(find("Atlantis").is_none());
    }

    #[test]
    fn test_normals_lookup() {
        let delhi = normals("Delhi").unwrap();
        assert_eq!(delhi.for_month(5), Some((40.0, 25.0, 13.0)));
        assert_eq!(delhi.for_month(0), None);
        assert_eq!(delhi.for_month(13), None);

        // Registered city without a long-run table
        assert!(normals("Madurai").is_none());
    }
}
