//! Turns one raw vendor device object into a [`Device`].
//!
//! The vendor payload is unversioned and its field set changes with model and
//! firmware. Every canonical field has an ordered list of [`KeySource`]s; the
//! first source holding a value of the right type wins, anything else is
//! treated as absent. Only a missing identity (`id` or `name`) is an error.

use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::{DateTime, TimeZone, Utc};
use log::debug;
use serde_json::{Map, Value};

use crate::device::Device;
use crate::error::NormalizationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Id,
    Name,
    Model,
    Temperature,
    Humidity,
    Battery,
    Online,
    WifiLevel,
    TemperatureWarning,
    HumidityWarning,
    UploadRate,
    PowerSaveMode,
    AverageDailyTemperature,
    AverageDailyHumidity,
    LastSeen,
    HardwareVersion,
    SoftwareVersion,
}

/// Part of the raw payload a key is looked up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    /// The device object itself.
    Root,
    /// `deviceExt.lastDeviceData`, an object or a JSON encoded string.
    LastData,
    /// `deviceExt.deviceSettings`, an object or a JSON encoded string.
    Settings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeySource {
    pub layer: Layer,
    pub key: String,
    /// Numeric values are divided by this before range checks.
    pub divisor: f64,
}

impl KeySource {
    pub fn new(layer: Layer, key: impl Into<String>) -> Self {
        Self {
            layer,
            key: key.into(),
            divisor: 1.0,
        }
    }

    pub fn root(key: impl Into<String>) -> Self {
        Self::new(Layer::Root, key)
    }

    pub fn last_data(key: impl Into<String>) -> Self {
        Self::new(Layer::LastData, key)
    }

    pub fn settings(key: impl Into<String>) -> Self {
        Self::new(Layer::Settings, key)
    }

    /// Vendor reports the value in hundredths (2160 = 21.6).
    pub fn hundredths(mut self) -> Self {
        self.divisor = 100.0;
        self
    }
}

/// Field mapping table plus the parse routine.
#[derive(Debug, Clone)]
pub struct Normalizer {
    sources: HashMap<Field, Vec<KeySource>>,
}

impl Default for Normalizer {
    fn default() -> Self {
        use KeySource as K;

        let table = [
            (Field::Id, vec![K::root("id"), K::root("device"), K::settings("device")]),
            (
                Field::Name,
                vec![K::root("name"), K::root("deviceName"), K::settings("deviceName")],
            ),
            (Field::Model, vec![K::root("model"), K::root("sku"), K::settings("sku")]),
            (
                Field::Temperature,
                vec![
                    K::root("temperature"),
                    K::root("temp"),
                    K::last_data("tem").hundredths(),
                ],
            ),
            (
                Field::Humidity,
                vec![K::root("humidity"), K::last_data("hum").hundredths()],
            ),
            (
                Field::Battery,
                vec![K::root("battery"), K::settings("battery"), K::last_data("battery")],
            ),
            (Field::Online, vec![K::root("online"), K::last_data("online")]),
            (
                Field::WifiLevel,
                vec![K::root("wifi_level"), K::root("wifiLevel"), K::settings("wifiLevel")],
            ),
            (
                Field::TemperatureWarning,
                vec![K::root("temperature_warning"), K::settings("temWarning")],
            ),
            (
                Field::HumidityWarning,
                vec![K::root("humidity_warning"), K::settings("humWarning")],
            ),
            (
                Field::UploadRate,
                vec![K::root("upload_rate"), K::settings("uploadRate")],
            ),
            (
                Field::PowerSaveMode,
                vec![K::root("power_save_mode"), K::settings("powerSaveModeState")],
            ),
            (
                Field::AverageDailyTemperature,
                vec![
                    K::root("average_daily_temperature"),
                    K::last_data("avgDayTem").hundredths(),
                ],
            ),
            (
                Field::AverageDailyHumidity,
                vec![
                    K::root("average_daily_humidity"),
                    K::last_data("avgDayHum").hundredths(),
                ],
            ),
            (Field::LastSeen, vec![K::root("last_seen"), K::last_data("lastTime")]),
            (
                Field::HardwareVersion,
                vec![K::root("versionHard"), K::settings("versionHard")],
            ),
            (
                Field::SoftwareVersion,
                vec![K::root("versionSoft"), K::settings("versionSoft")],
            ),
        ];

        Self {
            sources: table.into_iter().collect(),
        }
    }
}

impl Normalizer {
    /// Adds an alternate key for `field`, tried after the existing ones.
    pub fn with_alias(mut self, field: Field, source: KeySource) -> Self {
        self.sources.entry(field).or_default().push(source);
        self
    }

    pub fn sources(&self, field: Field) -> &[KeySource] {
        self.sources.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn parse(&self, raw: &Value) -> Result<Device, NormalizationError> {
        let root = raw.as_object().ok_or(NormalizationError::NotAnObject)?;
        let layers = Layers {
            root,
            last_data: embedded(root, "lastDeviceData"),
            settings: embedded(root, "deviceSettings"),
        };

        let id = self
            .first(&layers, Field::Id, |v, _| text(v))
            .ok_or(NormalizationError::MissingIdentity("id"))?;
        let name = self
            .first(&layers, Field::Name, |v, _| text(v))
            .ok_or(NormalizationError::MissingIdentity("name"))?;

        Ok(Device {
            id,
            name,
            model: self.first(&layers, Field::Model, |v, _| text(v)),
            temperature: self.first(&layers, Field::Temperature, scaled),
            humidity: self.first(&layers, Field::Humidity, |v, s| percentage(v, s)),
            battery: self
                .first(&layers, Field::Battery, percentage)
                .map(|pct| pct.round() as u8),
            online: self.first(&layers, Field::Online, |v, _| flag(v)),
            wifi_level: self.first(&layers, Field::WifiLevel, |v, _| integer(v)),
            temperature_warning: self.first(&layers, Field::TemperatureWarning, |v, _| flag(v)),
            humidity_warning: self.first(&layers, Field::HumidityWarning, |v, _| flag(v)),
            upload_rate: self.first(&layers, Field::UploadRate, |v, _| {
                integer(v).and_then(|n| u32::try_from(n).ok())
            }),
            power_save_mode: self.first(&layers, Field::PowerSaveMode, |v, _| flag(v)),
            average_daily_temperature: self.first(&layers, Field::AverageDailyTemperature, scaled),
            average_daily_humidity: self.first(&layers, Field::AverageDailyHumidity, percentage),
            last_seen: self.first(&layers, Field::LastSeen, |v, _| timestamp(v)),
            hardware_version: self.first(&layers, Field::HardwareVersion, |v, _| text(v)),
            software_version: self.first(&layers, Field::SoftwareVersion, |v, _| text(v)),
        })
    }

    fn first<T>(
        &self,
        layers: &Layers<'_>,
        field: Field,
        extract: impl Fn(&Value, &KeySource) -> Option<T>,
    ) -> Option<T> {
        self.sources(field).iter().find_map(|source| {
            let value = layers.get(source)?;
            let out = extract(value, source);
            if out.is_none() && !value.is_null() {
                debug!("{field:?}: ignoring '{}' = {value}", source.key);
            }
            out
        })
    }
}

/// Parses with the built-in field table.
pub fn parse(raw: &Value) -> Result<Device, NormalizationError> {
    static DEFAULT: OnceLock<Normalizer> = OnceLock::new();
    DEFAULT.get_or_init(Normalizer::default).parse(raw)
}

struct Layers<'a> {
    root: &'a Map<String, Value>,
    last_data: Option<Map<String, Value>>,
    settings: Option<Map<String, Value>>,
}

impl Layers<'_> {
    fn get(&self, source: &KeySource) -> Option<&Value> {
        match source.layer {
            Layer::Root => self.root.get(&source.key),
            Layer::LastData => self.last_data.as_ref()?.get(&source.key),
            Layer::Settings => self.settings.as_ref()?.get(&source.key),
        }
    }
}

fn embedded(root: &Map<String, Value>, key: &str) -> Option<Map<String, Value>> {
    let value = root.get("deviceExt")?.as_object()?.get(key)?;
    match value {
        Value::Object(map) => Some(map.clone()),
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => Some(map),
            Ok(other) => {
                debug!("deviceExt.{key} is not an object: {other}");
                None
            }
            Err(err) => {
                debug!("deviceExt.{key} is not valid JSON: {err}");
                None
            }
        },
        _ => None,
    }
}

fn text(value: &Value) -> Option<String> {
    let s = value.as_str()?.trim();
    (!s.is_empty()).then(|| s.to_string())
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

fn scaled(value: &Value, source: &KeySource) -> Option<f64> {
    number(value).map(|n| n / source.divisor)
}

fn percentage(value: &Value, source: &KeySource) -> Option<f64> {
    scaled(value, source).filter(|pct| (0.0..=100.0).contains(pct))
}

fn integer(value: &Value) -> Option<i64> {
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    number(value)
        .filter(|n| n.fract() == 0.0 && n.abs() < i64::MAX as f64)
        .map(|n| n as i64)
}

fn flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Epoch milliseconds.
fn timestamp(value: &Value) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(integer(value)?).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn govee_payload() -> Value {
        json!({
            "deviceId": 12345,
            "groupId": 0,
            "sku": "H5179",
            "device": "AA:BB:CC:DD:EE:FF",
            "deviceName": "Living Room",
            "versionHard": "1.00.01",
            "versionSoft": "1.02.03",
            "deviceExt": {
                "deviceSettings": json!({
                    "battery": 87,
                    "wifiLevel": 3,
                    "temWarning": false,
                    "humWarning": true,
                    "uploadRate": 10,
                    "powerSaveModeState": false,
                })
                .to_string(),
                "lastDeviceData": json!({
                    "online": true,
                    "tem": 2160,
                    "hum": 5500,
                    "lastTime": 1_700_000_000_000_i64,
                    "avgDayTem": 2050,
                    "avgDayHum": 0,
                })
                .to_string(),
            }
        })
    }

    fn close(a: Option<f64>, b: f64) -> bool {
        a.map_or(false, |a| (a - b).abs() < 1e-9)
    }

    #[test]
    fn flat_payload_with_renamed_temperature() {
        let raw = json!([{"id": "a1", "name": "Kitchen", "temp": 23.45, "humidity": 0}]);
        let dev = parse(&raw[0]).unwrap();

        let mut expected = Device::new("a1", "Kitchen");
        expected.temperature = Some(23.45);
        expected.humidity = Some(0.0);
        assert_eq!(dev, expected);
    }

    #[test]
    fn zero_humidity_is_not_absent() {
        let zero = parse(&json!({"id": "a", "name": "b", "humidity": 0})).unwrap();
        assert_eq!(zero.humidity, Some(0.0));

        let missing = parse(&json!({"id": "a", "name": "b"})).unwrap();
        assert_eq!(missing.humidity, None);

        let nested = parse(&json!({
            "id": "a",
            "name": "b",
            "deviceExt": {"lastDeviceData": "{\"hum\":0,\"tem\":0}"}
        }))
        .unwrap();
        assert_eq!(nested.humidity, Some(0.0));
        assert_eq!(nested.temperature, Some(0.0));
    }

    #[test]
    fn missing_identity_is_an_error() {
        assert_eq!(
            parse(&json!({"temp": 20.0})),
            Err(NormalizationError::MissingIdentity("id"))
        );
        assert_eq!(
            parse(&json!({"id": "a1"})),
            Err(NormalizationError::MissingIdentity("name"))
        );
        assert_eq!(
            parse(&json!({"id": "  ", "name": "Kitchen"})),
            Err(NormalizationError::MissingIdentity("id"))
        );
        assert_eq!(
            parse(&json!({"id": 17, "name": "Kitchen"})),
            Err(NormalizationError::MissingIdentity("id"))
        );
        assert_eq!(parse(&json!("a1")), Err(NormalizationError::NotAnObject));
    }

    #[test]
    fn govee_nested_payload() {
        let dev = parse(&govee_payload()).unwrap();

        assert_eq!(dev.id, "AA:BB:CC:DD:EE:FF");
        assert_eq!(dev.name, "Living Room");
        assert_eq!(dev.model.as_deref(), Some("H5179"));
        assert!(close(dev.temperature, 21.6));
        assert!(close(dev.humidity, 55.0));
        assert_eq!(dev.battery, Some(87));
        assert_eq!(dev.online, Some(true));
        assert_eq!(dev.wifi_level, Some(3));
        assert_eq!(dev.temperature_warning, Some(false));
        assert_eq!(dev.humidity_warning, Some(true));
        assert_eq!(dev.upload_rate, Some(10));
        assert_eq!(dev.power_save_mode, Some(false));
        assert!(close(dev.average_daily_temperature, 20.5));
        assert_eq!(dev.average_daily_humidity, Some(0.0));
        assert_eq!(
            dev.last_seen.map(|ts| ts.timestamp_millis()),
            Some(1_700_000_000_000)
        );
        assert_eq!(dev.hardware_version.as_deref(), Some("1.00.01"));
        assert_eq!(dev.software_version.as_deref(), Some("1.02.03"));
    }

    #[test]
    fn embedded_layers_may_be_objects() {
        let dev = parse(&json!({
            "device": "11:22",
            "deviceName": "Garage",
            "deviceExt": {
                "lastDeviceData": {"tem": -350, "online": false},
                "deviceSettings": {"battery": 12}
            }
        }))
        .unwrap();
        assert!(close(dev.temperature, -3.5));
        assert_eq!(dev.online, Some(false));
        assert_eq!(dev.battery, Some(12));
    }

    #[test]
    fn broken_embedded_json_only_drops_readings() {
        let dev = parse(&json!({
            "device": "11:22",
            "deviceName": "Garage",
            "deviceExt": {"lastDeviceData": "{not json", "deviceSettings": "[1,2]"}
        }))
        .unwrap();
        assert_eq!(dev.temperature, None);
        assert_eq!(dev.battery, None);
        assert!(!dev.is_sensor());
    }

    #[test]
    fn mistyped_or_out_of_range_fields_are_absent() {
        let dev = parse(&json!({
            "id": "a1",
            "name": "Kitchen",
            "temperature": "hot",
            "humidity": 120,
            "battery": -5,
            "online": "maybe",
            "wifi_level": 2.5,
            "upload_rate": -10,
            "model": 5179,
            "last_seen": {"ms": 1},
        }))
        .unwrap();
        assert_eq!(dev, Device::new("a1", "Kitchen"));
    }

    #[test]
    fn later_source_used_when_earlier_is_mistyped() {
        let dev = parse(&json!({
            "id": "a1",
            "name": "Kitchen",
            "temperature": null,
            "temp": [],
            "deviceExt": {"lastDeviceData": "{\"tem\":1999}"}
        }))
        .unwrap();
        assert!(close(dev.temperature, 19.99));
    }

    #[test]
    fn earlier_source_wins() {
        let dev = parse(&json!({
            "id": "a1",
            "name": "Kitchen",
            "temperature": 25.0,
            "deviceExt": {"lastDeviceData": "{\"tem\":1999}"}
        }))
        .unwrap();
        assert_eq!(dev.temperature, Some(25.0));
    }

    #[test]
    fn loose_scalar_encodings() {
        let dev = parse(&json!({
            "id": "a1",
            "name": "Kitchen",
            "temperature": " 21.5 ",
            "online": 1,
            "power_save_mode": "false",
            "battery": "99.6",
            "wifi_level": "-3",
        }))
        .unwrap();
        assert_eq!(dev.temperature, Some(21.5));
        assert_eq!(dev.online, Some(true));
        assert_eq!(dev.power_save_mode, Some(false));
        assert_eq!(dev.battery, Some(100));
        assert_eq!(dev.wifi_level, Some(-3));
    }

    #[test]
    fn alias_extends_the_table() {
        let normalizer = Normalizer::default()
            .with_alias(Field::Temperature, KeySource::root("tempC"))
            .with_alias(Field::Humidity, KeySource::settings("rh").hundredths());

        let raw = json!({
            "id": "a1",
            "name": "Kitchen",
            "tempC": 18.0,
            "deviceExt": {"deviceSettings": {"rh": 4200}}
        });
        let dev = normalizer.parse(&raw).unwrap();
        assert_eq!(dev.temperature, Some(18.0));
        assert!(close(dev.humidity, 42.0));

        assert_eq!(parse(&raw).unwrap().temperature, None);
        assert_eq!(normalizer.sources(Field::Temperature).len(), 4);
    }

    #[test]
    fn survives_removal_and_corruption_of_every_optional_field() {
        let corruptions = [
            Value::Null,
            json!("garbage"),
            json!([]),
            json!({}),
            json!(true),
            json!(-1),
            json!(1e300),
        ];

        let mut base = govee_payload();
        base["id"] = json!("stable-id");
        base["name"] = json!("Stable");

        let mut candidates: Vec<Value> = Vec::new();
        let keys: Vec<String> = base.as_object().unwrap().keys().cloned().collect();
        for key in keys.iter().filter(|k| *k != "id" && *k != "name") {
            let mut removed = base.clone();
            removed.as_object_mut().unwrap().remove(key);
            candidates.push(removed);

            for bad in &corruptions {
                let mut corrupted = base.clone();
                corrupted[key.as_str()] = bad.clone();
                candidates.push(corrupted);
            }
        }

        for ext_key in ["deviceSettings", "lastDeviceData"] {
            for bad in &corruptions {
                let mut corrupted = base.clone();
                corrupted["deviceExt"][ext_key] = bad.clone();
                candidates.push(corrupted);
            }
        }

        for raw in candidates {
            let dev = parse(&raw).unwrap_or_else(|err| panic!("{err} for {raw}"));
            assert_eq!(dev.id, "stable-id");
            assert_eq!(dev.name, "Stable");
            if let Some(h) = dev.humidity {
                assert!((0.0..=100.0).contains(&h));
            }
        }
    }

    #[test]
    fn survives_corruption_of_every_embedded_key() {
        let corruptions = [
            Value::Null,
            json!("x"),
            json!([]),
            json!({}),
            json!(true),
            json!(-1),
            json!(1e300),
            json!(i64::MIN),
        ];
        let base = govee_payload();

        for ext_key in ["deviceSettings", "lastDeviceData"] {
            let layer: Map<String, Value> =
                serde_json::from_str(base["deviceExt"][ext_key].as_str().unwrap()).unwrap();

            for key in layer.keys() {
                let mut variants = Vec::new();
                let mut removed = layer.clone();
                removed.remove(key);
                variants.push(removed);
                for bad in &corruptions {
                    let mut corrupted = layer.clone();
                    corrupted.insert(key.clone(), bad.clone());
                    variants.push(corrupted);
                }

                for variant in variants {
                    let variant = Value::Object(variant);
                    for encoded in [Value::String(variant.to_string()), variant.clone()] {
                        let mut raw = base.clone();
                        raw["deviceExt"][ext_key] = encoded;

                        let dev = parse(&raw).unwrap_or_else(|err| panic!("{err} for {raw}"));
                        assert_eq!(dev.id, "AA:BB:CC:DD:EE:FF");
                        if let Some(h) = dev.humidity {
                            assert!((0.0..=100.0).contains(&h), "humidity {h} for {raw}");
                        }
                        if let Some(b) = dev.battery {
                            assert!(b <= 100, "battery {b} for {raw}");
                        }

                        // the untouched layer keeps its readings
                        if ext_key == "deviceSettings" {
                            assert!(close(dev.temperature, 21.6));
                            assert!(close(dev.humidity, 55.0));
                        } else {
                            assert_eq!(dev.battery, Some(87));
                            assert_eq!(dev.upload_rate, Some(10));
                        }
                    }
                }
            }
        }
    }
}
