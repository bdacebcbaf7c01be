//! Typed variables and the destinations they write into.
//!
//! A variable binds a name (used for the `--flag`, the environment variable
//! and the config key) to a caller-owned [`Destination`]. The concrete
//! variants are aliases of [`TypedVariable`] over the supported native
//! types; [`ConfigVariable`](crate::ConfigVariable) is the one variant that
//! supplies a config document instead of receiving a value.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use clap::parser::ValueSource;
use clap::{Arg, ArgAction, ArgMatches};
use serde::Serialize;

use crate::config::ConfigVariable;
use crate::duration::parse_duration;
use crate::error::CmdfigError;
use crate::value::Value;

static NEXT_DESTINATION: AtomicU64 = AtomicU64::new(1);

/// Identity of a destination. Clones of a [`Destination`] share it, so two
/// variables bound to the same destination compare equal here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DestinationId(u64);

impl DestinationId {
    fn mint() -> Self {
        DestinationId(NEXT_DESTINATION.fetch_add(1, Ordering::Relaxed))
    }
}

/// A shared, caller-owned slot a resolved value is written into.
///
/// Hand a clone to each variable that should write here and keep one to read
/// the final value after resolution.
pub struct Destination<T> {
    id: DestinationId,
    cell: Rc<RefCell<T>>,
}

impl<T> Destination<T> {
    pub fn new(initial: T) -> Self {
        Self {
            id: DestinationId::mint(),
            cell: Rc::new(RefCell::new(initial)),
        }
    }

    pub fn id(&self) -> DestinationId {
        self.id
    }

    pub fn set(&self, value: T) {
        *self.cell.borrow_mut() = value;
    }

    /// Run `f` against the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.cell.borrow())
    }
}

impl<T: Clone> Destination<T> {
    pub fn get(&self) -> T {
        self.cell.borrow().clone()
    }
}

impl<T: Default> Default for Destination<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> Clone for Destination<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            cell: Rc::clone(&self.cell),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Destination<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Destination")
            .field("id", &self.id)
            .field("value", &self.cell.borrow())
            .finish()
    }
}

/// A native type a [`TypedVariable`] can hold.
///
/// Each implementation fixes how the type is parsed from the environment,
/// registered as a flag, and coerced from a dynamically typed [`Value`].
pub trait VariableType: Clone + Default + fmt::Debug + Send + Sync + 'static {
    const TYPE_NAME: &'static str;

    fn to_value(&self) -> Value;

    /// Accept the native shape or an adjacent one (see the crate docs for
    /// the coercion table).
    fn coerce(value: &Value) -> Result<Self, String>;

    fn parse_env(raw: &str) -> Result<Self, String>;

    /// Attach the value parser and arity for this type.
    fn flag_arg(arg: Arg) -> Arg;
}

fn mismatch<T: VariableType>(value: &Value) -> String {
    format!("expected {}, found {} '{value}'", T::TYPE_NAME, value.type_name())
}

/// Boolean grammar shared by environment values and `--flag=<bool>`.
pub(crate) fn parse_bool(raw: &str) -> Result<bool, String> {
    match raw {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
        _ => Err(format!("invalid boolean '{raw}'")),
    }
}

/// Integer grammar: optional sign, then decimal, `0x` hex, `0o`/leading-zero
/// octal, or `0b` binary. `_` may separate digits, or follow a base prefix.
pub(crate) fn parse_int(raw: &str) -> Result<i64, String> {
    let invalid = || format!("invalid integer '{raw}'");
    let (negative, unsigned) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw.strip_prefix('+').unwrap_or(raw)),
    };
    if !underscores_ok(unsigned) {
        return Err(invalid());
    }
    let digits = unsigned.replace('_', "");

    let prefixed = |lower: &str, upper: &str| {
        digits
            .strip_prefix(lower)
            .or_else(|| digits.strip_prefix(upper))
    };
    let (radix, body) = if let Some(rest) = prefixed("0x", "0X") {
        (16, rest)
    } else if let Some(rest) = prefixed("0o", "0O") {
        (8, rest)
    } else if let Some(rest) = prefixed("0b", "0B") {
        (2, rest)
    } else if digits.len() > 1 && digits.starts_with('0') {
        (8, &digits[1..])
    } else {
        (10, digits.as_str())
    };

    if body.is_empty() || body.starts_with(['+', '-']) {
        return Err(invalid());
    }
    let magnitude = u64::from_str_radix(body, radix).map_err(|_| invalid())?;
    if negative {
        if magnitude > i64::MAX as u64 + 1 {
            return Err(format!("integer '{raw}' is out of range"));
        }
        Ok((magnitude as i64).wrapping_neg())
    } else {
        i64::try_from(magnitude).map_err(|_| format!("integer '{raw}' is out of range"))
    }
}

/// Each `_` must sit between two digits, or between a base prefix and a
/// digit. Characters other than digits and `_` are left for the radix parse.
fn underscores_ok(unsigned: &str) -> bool {
    #[derive(PartialEq)]
    enum Last {
        Start,
        Digit,
        Underscore,
        Other,
    }

    let bytes = unsigned.as_bytes();
    let (start, mut last, hex) = match bytes {
        [b'0', p, ..] if matches!(p.to_ascii_lowercase(), b'b' | b'o' | b'x') => {
            (2, Last::Digit, p.to_ascii_lowercase() == b'x')
        }
        _ => (0, Last::Start, false),
    };

    for &c in &bytes[start..] {
        if c.is_ascii_digit() || (hex && c.is_ascii_hexdigit()) {
            last = Last::Digit;
        } else if c == b'_' {
            if last != Last::Digit {
                return false;
            }
            last = Last::Underscore;
        } else if last == Last::Underscore {
            return false;
        } else {
            last = Last::Other;
        }
    }
    last != Last::Underscore
}

/// Truncate toward zero; `None` when the float is not finite or does not fit.
fn truncate_to_i64(x: f64) -> Option<i64> {
    let t = x.trunc();
    // i64::MAX as f64 rounds up to 2^63, which is itself out of range.
    if t.is_finite() && t >= i64::MIN as f64 && t < i64::MAX as f64 {
        Some(t as i64)
    } else {
        None
    }
}

impl VariableType for String {
    const TYPE_NAME: &'static str = "string";

    fn to_value(&self) -> Value {
        Value::String(self.clone())
    }

    fn coerce(value: &Value) -> Result<Self, String> {
        match value {
            Value::String(s) => Ok(s.clone()),
            other => Err(mismatch::<Self>(other)),
        }
    }

    fn parse_env(raw: &str) -> Result<Self, String> {
        Ok(raw.to_string())
    }

    fn flag_arg(arg: Arg) -> Arg {
        arg.action(ArgAction::Set)
            .value_parser(clap::value_parser!(String))
    }
}

impl VariableType for bool {
    const TYPE_NAME: &'static str = "bool";

    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }

    fn coerce(value: &Value) -> Result<Self, String> {
        match value {
            Value::Bool(b) => Ok(*b),
            other => Err(mismatch::<Self>(other)),
        }
    }

    fn parse_env(raw: &str) -> Result<Self, String> {
        parse_bool(raw)
    }

    /// `--name` alone means true; an explicit value needs `--name=<bool>` so
    /// that the following token is never swallowed.
    fn flag_arg(arg: Arg) -> Arg {
        arg.action(ArgAction::Set)
            .num_args(0..=1)
            .require_equals(true)
            .default_missing_value("true")
            .value_parser(parse_bool)
    }
}

impl VariableType for i32 {
    const TYPE_NAME: &'static str = "int";

    fn to_value(&self) -> Value {
        Value::Int(i64::from(*self))
    }

    fn coerce(value: &Value) -> Result<Self, String> {
        let wide = match value {
            Value::Int(i) => *i,
            Value::Float(x) => {
                truncate_to_i64(*x).ok_or_else(|| format!("{x} is out of range for int"))?
            }
            other => return Err(mismatch::<Self>(other)),
        };
        i32::try_from(wide).map_err(|_| format!("{wide} is out of range for int"))
    }

    fn parse_env(raw: &str) -> Result<Self, String> {
        let wide = parse_int(raw)?;
        i32::try_from(wide).map_err(|_| format!("{wide} is out of range for int"))
    }

    fn flag_arg(arg: Arg) -> Arg {
        arg.action(ArgAction::Set)
            .value_parser(<i32 as VariableType>::parse_env)
    }
}

impl VariableType for i64 {
    const TYPE_NAME: &'static str = "int64";

    fn to_value(&self) -> Value {
        Value::Int(*self)
    }

    fn coerce(value: &Value) -> Result<Self, String> {
        match value {
            Value::Int(i) => Ok(*i),
            Value::Float(x) => {
                truncate_to_i64(*x).ok_or_else(|| format!("{x} is out of range for int64"))
            }
            other => Err(mismatch::<Self>(other)),
        }
    }

    fn parse_env(raw: &str) -> Result<Self, String> {
        parse_int(raw)
    }

    fn flag_arg(arg: Arg) -> Arg {
        arg.action(ArgAction::Set).value_parser(parse_int)
    }
}

impl VariableType for f64 {
    const TYPE_NAME: &'static str = "float64";

    fn to_value(&self) -> Value {
        Value::Float(*self)
    }

    fn coerce(value: &Value) -> Result<Self, String> {
        match value {
            Value::Float(x) => Ok(*x),
            Value::Int(i) => Ok(*i as f64),
            other => Err(mismatch::<Self>(other)),
        }
    }

    fn parse_env(raw: &str) -> Result<Self, String> {
        raw.parse::<f64>()
            .map_err(|e| format!("invalid float '{raw}': {e}"))
    }

    fn flag_arg(arg: Arg) -> Arg {
        arg.action(ArgAction::Set)
            .value_parser(<f64 as VariableType>::parse_env)
    }
}

impl VariableType for Duration {
    const TYPE_NAME: &'static str = "duration";

    fn to_value(&self) -> Value {
        Value::Duration(*self)
    }

    fn coerce(value: &Value) -> Result<Self, String> {
        match value {
            Value::Duration(d) => Ok(*d),
            Value::String(s) => parse_duration(s).map_err(|e| e.to_string()),
            other => Err(mismatch::<Self>(other)),
        }
    }

    fn parse_env(raw: &str) -> Result<Self, String> {
        parse_duration(raw).map_err(|e| e.to_string())
    }

    fn flag_arg(arg: Arg) -> Arg {
        arg.action(ArgAction::Set).value_parser(parse_duration)
    }
}

/// Behavior shared by every declared variable, whatever its native type.
pub trait Variable {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn is_required(&self) -> bool;
    fn destination_id(&self) -> DestinationId;
    fn type_name(&self) -> &'static str;

    /// The configured default, if any.
    fn default_value(&self) -> Option<Value>;

    /// Write the default into the destination, if one is configured.
    fn set_defaults(&self);

    /// The flag this variable registers on its command's parser.
    fn bind_flag(&self) -> Arg;

    /// The flag's value, only when it was given explicitly on the command
    /// line (an explicit zero value counts).
    fn flag_value(&self, matches: &ArgMatches) -> Result<Option<Value>, CmdfigError>;

    /// Parse a raw environment string into this variable's type.
    fn env_value(&self, raw: &str, env_name: &str) -> Result<Value, CmdfigError>;

    /// Coerce `value` and write it into the destination.
    fn apply_value(&self, value: &Value) -> Result<(), CmdfigError>;

    fn as_config(&self) -> Option<&ConfigVariable> {
        None
    }

    fn as_config_mut(&mut self) -> Option<&mut ConfigVariable> {
        None
    }
}

/// A variable holding a value of native type `T`.
#[derive(Debug, Clone)]
pub struct TypedVariable<T: VariableType> {
    name: String,
    description: String,
    default: Option<T>,
    required: bool,
    destination: Destination<T>,
}

pub type StringVariable = TypedVariable<String>;
pub type BoolVariable = TypedVariable<bool>;
pub type IntVariable = TypedVariable<i32>;
pub type Int64Variable = TypedVariable<i64>;
pub type Float64Variable = TypedVariable<f64>;
pub type DurationVariable = TypedVariable<Duration>;

impl<T: VariableType> TypedVariable<T> {
    /// A variable writing into a fresh destination of its own. Use
    /// [`bind`](Self::bind) to share a caller-owned one.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            default: None,
            required: false,
            destination: Destination::default(),
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    /// Configure a default. It is the lowest-priority source and also
    /// satisfies `required`.
    pub fn default(mut self, value: impl Into<T>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Write into `destination` instead of the variable's own slot.
    pub fn bind(mut self, destination: &Destination<T>) -> Self {
        self.destination = destination.clone();
        self
    }

    pub fn destination(&self) -> &Destination<T> {
        &self.destination
    }
}

impl<T: VariableType> Variable for TypedVariable<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn is_required(&self) -> bool {
        self.required
    }

    fn destination_id(&self) -> DestinationId {
        self.destination.id()
    }

    fn type_name(&self) -> &'static str {
        T::TYPE_NAME
    }

    fn default_value(&self) -> Option<Value> {
        self.default.as_ref().map(VariableType::to_value)
    }

    fn set_defaults(&self) {
        if let Some(default) = &self.default {
            self.destination.set(default.clone());
        }
    }

    fn bind_flag(&self) -> Arg {
        let arg = Arg::new(self.name.clone())
            .long(self.name.clone())
            .help(self.description.clone())
            .value_name(T::TYPE_NAME.to_uppercase());
        T::flag_arg(arg)
    }

    fn flag_value(&self, matches: &ArgMatches) -> Result<Option<Value>, CmdfigError> {
        if matches.value_source(&self.name) != Some(ValueSource::CommandLine) {
            return Ok(None);
        }
        let value = matches
            .try_get_one::<T>(&self.name)
            .map_err(|e| CmdfigError::invalid(&self.name, format!("--{}", self.name), e.to_string()))?;
        Ok(value.map(VariableType::to_value))
    }

    fn env_value(&self, raw: &str, env_name: &str) -> Result<Value, CmdfigError> {
        T::parse_env(raw)
            .map(|v| v.to_value())
            .map_err(|reason| {
                CmdfigError::invalid(&self.name, format!("environment ({env_name})"), reason)
            })
    }

    fn apply_value(&self, value: &Value) -> Result<(), CmdfigError> {
        let native = T::coerce(value).map_err(|reason| {
            CmdfigError::invalid(&self.name, format!("a {} value", value.type_name()), reason)
        })?;
        self.destination.set(native);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches_for(var: &dyn Variable, args: &[&str]) -> ArgMatches {
        clap::Command::new("test")
            .no_binary_name(true)
            .args_override_self(true)
            .allow_negative_numbers(true)
            .arg(var.bind_flag())
            .try_get_matches_from(args)
            .unwrap()
    }

    #[test]
    fn destination_clones_share_identity_and_value() {
        let a = Destination::new(String::new());
        let b = a.clone();
        b.set("shared".into());
        assert_eq!(a.get(), "shared");
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), Destination::new(String::new()).id());
    }

    #[test]
    fn bound_variables_report_the_same_destination() {
        let dest = Destination::new(0i64);
        let a = Int64Variable::new("a").bind(&dest);
        let b = Int64Variable::new("b").bind(&dest);
        assert_eq!(a.destination_id(), b.destination_id());
        assert_ne!(a.destination_id(), Int64Variable::new("c").destination_id());
    }

    #[test]
    fn int_accepts_adjacent_numeric_types() {
        let var = IntVariable::new("n");
        var.apply_value(&Value::Int(5)).unwrap();
        assert_eq!(var.destination().get(), 5);
        var.apply_value(&Value::Float(-7.9)).unwrap();
        assert_eq!(var.destination().get(), -7);
        assert!(var.apply_value(&Value::Int(i64::from(i32::MAX) + 1)).is_err());
        assert!(var.apply_value(&Value::from("5")).is_err());
    }

    #[test]
    fn float_widens_integers() {
        let var = Float64Variable::new("rate");
        var.apply_value(&Value::Int(3)).unwrap();
        assert_eq!(var.destination().get(), 3.0);
    }

    #[test]
    fn int64_truncates_floats_toward_zero() {
        let var = Int64Variable::new("n");
        var.apply_value(&Value::Float(2.99)).unwrap();
        assert_eq!(var.destination().get(), 2);
        assert!(var.apply_value(&Value::Float(f64::NAN)).is_err());
    }

    #[test]
    fn duration_accepts_strings() {
        let var = DurationVariable::new("timeout");
        var.apply_value(&Value::from("15s")).unwrap();
        assert_eq!(var.destination().get(), Duration::from_secs(15));
        var.apply_value(&Value::Duration(Duration::from_millis(5)))
            .unwrap();
        assert_eq!(var.destination().get(), Duration::from_millis(5));
        assert!(var.apply_value(&Value::from("soon")).is_err());
    }

    #[test]
    fn env_parsing_is_typed() {
        let flag = BoolVariable::new("verbose");
        assert_eq!(flag.env_value("F", "VERBOSE").unwrap(), Value::Bool(false));
        let err = flag.env_value("maybe", "VERBOSE").unwrap_err();
        assert!(err.to_string().contains("VERBOSE"));

        let count = IntVariable::new("count");
        assert_eq!(count.env_value("0x1f", "COUNT").unwrap(), Value::Int(31));
        assert!(count.env_value("ten", "COUNT").is_err());

        let name = StringVariable::new("name");
        assert_eq!(name.env_value("", "NAME").unwrap(), Value::from(""));
    }

    #[test]
    fn parse_int_grammar() {
        assert_eq!(parse_int("42"), Ok(42));
        assert_eq!(parse_int("-42"), Ok(-42));
        assert_eq!(parse_int("+7"), Ok(7));
        assert_eq!(parse_int("0b1010"), Ok(10));
        assert_eq!(parse_int("0o17"), Ok(15));
        assert_eq!(parse_int("017"), Ok(15));
        assert_eq!(parse_int("0xff_ff"), Ok(65535));
        assert_eq!(parse_int("0"), Ok(0));
        assert_eq!(parse_int("-9223372036854775808"), Ok(i64::MIN));
        assert!(parse_int("9223372036854775808").is_err());
        assert!(parse_int("").is_err());
        assert!(parse_int("0x").is_err());
        assert_eq!(parse_int("1_000"), Ok(1000));
        assert_eq!(parse_int("-1_000_000"), Ok(-1_000_000));
        assert_eq!(parse_int("0x_ff"), Ok(255));
        assert_eq!(parse_int("0b1_0"), Ok(2));
        assert_eq!(parse_int("0_7"), Ok(7));
    }

    #[test]
    fn parse_int_rejects_misplaced_underscores() {
        for raw in ["_1", "1_", "1__0", "0x_ff_", "0x__1", "0_", "-_5", "0x_"] {
            assert!(parse_int(raw).is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn defaults_are_optional() {
        let var = StringVariable::new("mode");
        assert_eq!(var.default_value(), None);
        var.set_defaults();
        assert_eq!(var.destination().get(), "");

        let var = StringVariable::new("mode").default("fast");
        assert_eq!(var.default_value(), Some(Value::from("fast")));
        var.set_defaults();
        assert_eq!(var.destination().get(), "fast");
    }

    #[test]
    fn flag_value_only_when_given() {
        let var = StringVariable::new("test-value").default("unused");
        let m = matches_for(&var, &[]);
        assert_eq!(var.flag_value(&m).unwrap(), None);

        let m = matches_for(&var, &["--test-value=random"]);
        assert_eq!(var.flag_value(&m).unwrap(), Some(Value::from("random")));

        let m = matches_for(&var, &["--test-value", "spaced"]);
        assert_eq!(var.flag_value(&m).unwrap(), Some(Value::from("spaced")));
    }

    #[test]
    fn explicit_zero_flags_are_registered() {
        let count = IntVariable::new("count");
        let m = matches_for(&count, &["--count=0"]);
        assert_eq!(count.flag_value(&m).unwrap(), Some(Value::Int(0)));

        let name = StringVariable::new("name");
        let m = matches_for(&name, &["--name="]);
        assert_eq!(name.flag_value(&m).unwrap(), Some(Value::from("")));
    }

    #[test]
    fn bool_flags() {
        let var = BoolVariable::new("verbose");
        let m = matches_for(&var, &["--verbose"]);
        assert_eq!(var.flag_value(&m).unwrap(), Some(Value::Bool(true)));

        let m = matches_for(&var, &["--verbose=false"]);
        assert_eq!(var.flag_value(&m).unwrap(), Some(Value::Bool(false)));

        let m = matches_for(&var, &[]);
        assert_eq!(var.flag_value(&m).unwrap(), None);
    }

    #[test]
    fn repeated_flag_last_wins() {
        let var = Int64Variable::new("n");
        let m = matches_for(&var, &["--n=1", "--n", "-2"]);
        assert_eq!(var.flag_value(&m).unwrap(), Some(Value::Int(-2)));
    }

    #[test]
    fn malformed_flag_value_fails_parse() {
        let var = DurationVariable::new("timeout");
        let result = clap::Command::new("test")
            .no_binary_name(true)
            .arg(var.bind_flag())
            .try_get_matches_from(["--timeout=soon"]);
        assert!(result.is_err());
    }
}
