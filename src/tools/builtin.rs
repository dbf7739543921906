use chrono::{Timelike, Utc};
use chrono_tz::Tz;
use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::error::{Error, Result};

/// Local demo tools that need no network access. Names are matched against
/// the `builtin` entries in the tool config.
pub const BUILTIN_TOOLS: &[&str] = &["get_weather", "get_time", "calculate"];

#[must_use]
pub fn is_builtin(name: &str) -> bool {
    BUILTIN_TOOLS.contains(&name)
}

#[derive(Debug, Deserialize, JsonSchema)]
struct WeatherArgs {
    /// City or place to report the weather for.
    location: String,
    /// Either "celsius" (default) or "fahrenheit".
    unit: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct TimeArgs {
    /// IANA timezone name such as "Europe/Paris".
    timezone: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct CalculateArgs {
    /// Arithmetic expression using numbers, + - * / %, and parentheses.
    expression: String,
}

/// Runs a builtin by name. The dispatcher validates names at load time, so
/// the fallthrough arm only fires on a registry bug.
pub fn execute(name: &str, args: &Value) -> Result<Value> {
    match name {
        "get_weather" => get_weather(args),
        "get_time" => get_time(args),
        "calculate" => calculate(args),
        other => Err(Error::UnknownTool(other.to_string())),
    }
}

#[must_use]
pub fn default_description(name: &str) -> Option<&'static str> {
    match name {
        "get_weather" => Some("Get the current weather for a location."),
        "get_time" => Some("Get the current date and time in a specific timezone."),
        "calculate" => Some("Evaluate a basic arithmetic expression."),
        _ => None,
    }
}

/// Parameter schema derived from the argument struct, used when the config
/// entry does not spell one out.
#[must_use]
pub fn default_parameters(name: &str) -> Option<Value> {
    let schema = match name {
        "get_weather" => schema_for!(WeatherArgs),
        "get_time" => schema_for!(TimeArgs),
        "calculate" => schema_for!(CalculateArgs),
        _ => return None,
    };
    let mut value = serde_json::to_value(schema).ok()?;
    if let Some(object) = value.as_object_mut() {
        object.remove("$schema");
        object.remove("title");
    }
    Some(value)
}

fn parse_args<T: DeserializeOwned>(args: &Value, required: &[&str]) -> Result<T> {
    for field in required {
        if args.get(field).is_none() {
            return Err(Error::InvalidArgument(format!(
                "Missing required parameter: {field}"
            )));
        }
    }
    serde_json::from_value(args.clone()).map_err(|err| Error::InvalidArgument(err.to_string()))
}

// Canned forecast so the demo works offline; only the unit changes the
// numbers.
fn get_weather(args: &Value) -> Result<Value> {
    let args: WeatherArgs = parse_args(args, &["location"])?;
    if args.location.trim().is_empty() {
        return Err(Error::InvalidArgument(
            "Missing required parameter: location".to_string(),
        ));
    }
    let (temperature, symbol, unit) = match args.unit.as_deref() {
        Some("fahrenheit") => (72, "°F", "fahrenheit"),
        _ => (22, "°C", "celsius"),
    };
    Ok(json!({
        "location": args.location,
        "temperature": temperature,
        "unit": unit,
        "condition": "Ensoleillé",
        "humidity": 65,
        "wind_speed": 15,
        "description": format!(
            "Il fait actuellement {temperature}{symbol} à {} avec un temps ensoleillé.",
            args.location
        ),
    }))
}

fn get_time(args: &Value) -> Result<Value> {
    let args: TimeArgs = parse_args(args, &["timezone"])?;
    let tz: Tz = args
        .timezone
        .parse()
        .map_err(|_| Error::InvalidArgument(format!("Timezone not found: {}", args.timezone)))?;
    let now = Utc::now().with_timezone(&tz);
    Ok(json!({
        "timezone": args.timezone,
        "datetime": now.to_rfc3339(),
        "formatted": now.format("%A %-d %B %Y %H:%M:%S").to_string(),
        "hour": now.hour(),
        "minute": now.minute(),
        "second": now.second(),
    }))
}

fn calculate(args: &Value) -> Result<Value> {
    let args: CalculateArgs = parse_args(args, &["expression"])?;
    let result = eval_expression(&args.expression)?;
    if !result.is_finite() {
        return Err(Error::InvalidArgument(format!(
            "Invalid expression: {}",
            args.expression
        )));
    }
    Ok(json!({
        "expression": args.expression,
        "result": result,
        "formatted": format!("{} = {result}", args.expression),
    }))
}

fn eval_expression(source: &str) -> Result<f64> {
    let mut parser = ExprParser {
        source,
        chars: source.chars().peekable(),
    };
    let value = parser.expression()?;
    parser.skip_spaces();
    if parser.chars.peek().is_some() {
        return Err(parser.invalid());
    }
    Ok(value)
}

/// Recursive-descent evaluator over + - * / % with parentheses and unary
/// minus.
struct ExprParser<'a> {
    source: &'a str,
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl ExprParser<'_> {
    fn invalid(&self) -> Error {
        Error::InvalidArgument(format!("Invalid expression: {}", self.source))
    }

    fn skip_spaces(&mut self) {
        while self.chars.peek().is_some_and(|c| c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn expression(&mut self) -> Result<f64> {
        let mut value = self.term()?;
        loop {
            self.skip_spaces();
            match self.chars.peek() {
                Some('+') => {
                    self.chars.next();
                    value += self.term()?;
                }
                Some('-') => {
                    self.chars.next();
                    value -= self.term()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn term(&mut self) -> Result<f64> {
        let mut value = self.factor()?;
        loop {
            self.skip_spaces();
            match self.chars.peek() {
                Some('*') => {
                    self.chars.next();
                    value *= self.factor()?;
                }
                // Division by zero yields a non-finite value rejected by the
                // caller.
                Some('/') => {
                    self.chars.next();
                    value /= self.factor()?;
                }
                Some('%') => {
                    self.chars.next();
                    value %= self.factor()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn factor(&mut self) -> Result<f64> {
        self.skip_spaces();
        match self.chars.peek() {
            Some('-') => {
                self.chars.next();
                Ok(-self.factor()?)
            }
            Some('(') => {
                self.chars.next();
                let value = self.expression()?;
                self.skip_spaces();
                if self.chars.next() == Some(')') {
                    Ok(value)
                } else {
                    Err(self.invalid())
                }
            }
            Some(c) if c.is_ascii_digit() || *c == '.' => self.number(),
            _ => Err(self.invalid()),
        }
    }

    fn number(&mut self) -> Result<f64> {
        let mut text = String::new();
        while let Some(c) = self.chars.peek().copied() {
            if c.is_ascii_digit() || c == '.' {
                text.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        text.parse().map_err(|_| self.invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weather_defaults_to_celsius() {
        let result = execute("get_weather", &json!({"location": "Paris"})).unwrap();
        assert_eq!(result["temperature"], 22);
        assert_eq!(result["unit"], "celsius");
        assert_eq!(result["condition"], "Ensoleillé");
        assert_eq!(result["wind_speed"], 15);
        let description = result["description"].as_str().unwrap();
        assert!(description.contains("22°C"));
        assert!(description.contains("Paris"));
    }

    #[test]
    fn weather_supports_fahrenheit() {
        let args = json!({"location": "Lyon", "unit": "fahrenheit"});
        let result = execute("get_weather", &args).unwrap();
        assert_eq!(result["temperature"], 72);
        assert!(result["description"].as_str().unwrap().contains("72°F"));
    }

    #[test]
    fn weather_requires_location() {
        for args in [json!({}), json!({"location": "  "})] {
            let err = execute("get_weather", &args).unwrap_err();
            match err {
                Error::InvalidArgument(msg) => {
                    assert_eq!(msg, "Missing required parameter: location");
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }

    #[test]
    fn time_reports_zone_and_clock_fields() {
        let result = execute("get_time", &json!({"timezone": "UTC"})).unwrap();
        assert_eq!(result["timezone"], "UTC");
        let datetime = result["datetime"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(datetime).is_ok());
        assert!(result["hour"].as_u64().unwrap() < 24);
        assert!(result["minute"].as_u64().unwrap() < 60);
        assert!(result["second"].as_u64().unwrap() < 61);
    }

    #[test]
    fn time_requires_timezone() {
        let err = execute("get_time", &json!({})).unwrap_err();
        match err {
            Error::InvalidArgument(msg) => {
                assert_eq!(msg, "Missing required parameter: timezone");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn time_rejects_unknown_timezone() {
        let err = execute("get_time", &json!({"timezone": "Mars/Olympus"})).unwrap_err();
        match err {
            Error::InvalidArgument(msg) => assert_eq!(msg, "Timezone not found: Mars/Olympus"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn calculate_respects_precedence() {
        let result = execute("calculate", &json!({"expression": "2 + 3 * 4"})).unwrap();
        assert!((result["result"].as_f64().unwrap() - 14.0).abs() < f64::EPSILON);
        assert_eq!(result["formatted"], "2 + 3 * 4 = 14");
    }

    #[test]
    fn calculate_supports_modulo() {
        let result = execute("calculate", &json!({"expression": "10 % 3"})).unwrap();
        assert!((result["result"].as_f64().unwrap() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn calculate_handles_parentheses_and_unary_minus() {
        let result = execute("calculate", &json!({"expression": "-(2 + 2) * 3"})).unwrap();
        assert!((result["result"].as_f64().unwrap() + 12.0).abs() < f64::EPSILON);
    }

    #[test]
    fn calculate_rejects_trailing_garbage() {
        let err = execute("calculate", &json!({"expression": "2 + 2 oops"})).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn calculate_rejects_division_by_zero() {
        let err = execute("calculate", &json!({"expression": "1 / 0"})).unwrap_err();
        match err {
            Error::InvalidArgument(msg) => assert_eq!(msg, "Invalid expression: 1 / 0"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn schemas_mark_required_fields() {
        let schema = default_parameters("get_weather").unwrap();
        assert!(schema.get("$schema").is_none());
        let required = schema["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v == "location"));
        assert_eq!(default_parameters("nope"), None);
    }
}
