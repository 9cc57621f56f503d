//! IR interchange model.
//!
//! The tensor-compiler framework owns IR construction and type inference;
//! what reaches dxtc is a list of already-partitioned items, each either a
//! function bound for an external kernel or some other module-level item.
//! This module is the serde model of that hand-off (JSON on disk).
//!
//! ```text
//! {
//!   "items": [
//!     { "item": "function",
//!       "external_name": "tvmgen_default_my_ts_mean_0",
//!       "kernel": "my_ts_mean",
//!       "params": [
//!         { "name": "data",   "shape": [10], "dtype": "float32" },
//!         { "name": "window", "shape": [1],  "dtype": "int32" }
//!       ] }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};

/// Element type of a tensor parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Float32,
    Float64,
    Int32,
    Int64,
}

impl DType {
    pub fn is_float(self) -> bool {
        matches!(self, DType::Float32 | DType::Float64)
    }

    /// C spelling of the element type.
    pub fn c_type(self) -> &'static str {
        match self {
            DType::Float32 => "float",
            DType::Float64 => "double",
            DType::Int32 => "int32_t",
            DType::Int64 => "int64_t",
        }
    }

    /// DLPack type code constant (`kDLFloat` / `kDLInt`).
    pub fn dl_code(self) -> &'static str {
        if self.is_float() {
            "kDLFloat"
        } else {
            "kDLInt"
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            DType::Float32 | DType::Int32 => 32,
            DType::Float64 | DType::Int64 => 64,
        }
    }

    /// Short suffix used to name per-type helpers (`f32`, `i64`, ...).
    pub fn suffix(self) -> &'static str {
        match self {
            DType::Float32 => "f32",
            DType::Float64 => "f64",
            DType::Int32 => "i32",
            DType::Int64 => "i64",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DType::Float32 => "float32",
            DType::Float64 => "float64",
            DType::Int32 => "int32",
            DType::Int64 => "int64",
        }
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One tensor parameter of an IR function. A negative extent is dynamic;
/// in JSON a dynamic extent may also be written `"?"`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_dims")]
    pub shape: Vec<i64>,
    pub dtype: DType,
}

impl Param {
    pub fn new(name: &str, shape: &[i64], dtype: DType) -> Self {
        Self {
            name: name.to_string(),
            shape: shape.to_vec(),
            dtype,
        }
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn is_dynamic(&self) -> bool {
        self.shape.iter().any(|&d| d < 0)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Dim {
    Extent(i64),
    Symbolic(String),
}

fn deserialize_dims<'de, D>(deserializer: D) -> Result<Vec<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Vec::<Dim>::deserialize(deserializer)?
        .into_iter()
        .map(|dim| match dim {
            Dim::Extent(n) => Ok(n),
            Dim::Symbolic(s) if s == "?" => Ok(-1),
            Dim::Symbolic(s) => Err(serde::de::Error::custom(format!(
                "invalid extent '{}' (expected an integer or \"?\")",
                s
            ))),
        })
        .collect()
}

/// A function partitioned out for an external kernel.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrFunction {
    /// Symbol the emitted entry point must carry. Mandatory for lowering.
    #[serde(default)]
    pub external_name: Option<String>,
    /// Structured kernel identifier attached when the function was built.
    #[serde(default)]
    pub kernel: Option<String>,
    #[serde(default)]
    pub params: Vec<Param>,
}

impl IrFunction {
    pub fn new(external_name: &str) -> Self {
        Self {
            external_name: Some(external_name.to_string()),
            kernel: None,
            params: Vec::new(),
        }
    }

    pub fn with_kernel(mut self, tag: &str) -> Self {
        self.kernel = Some(tag.to_string());
        self
    }

    pub fn param(mut self, name: &str, shape: &[i64], dtype: DType) -> Self {
        self.params.push(Param::new(name, shape, dtype));
        self
    }
}

/// A module-level IR item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "item", rename_all = "snake_case")]
pub enum IrItem {
    Function(IrFunction),
    Constant {
        name: String,
        dtype: DType,
        #[serde(default)]
        shape: Vec<i64>,
    },
}

impl IrItem {
    pub fn kind_name(&self) -> &'static str {
        match self {
            IrItem::Function(_) => "function",
            IrItem::Constant { .. } => "constant",
        }
    }
}

/// An ordered collection of IR items handed over for lowering.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrModule {
    #[serde(default)]
    pub items: Vec<IrItem>,
}

impl IrModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_function(mut self, func: IrFunction) -> Self {
        self.items.push(IrItem::Function(func));
        self
    }

    pub fn from_json(source: &str) -> Result<IrModule, serde_json::Error> {
        serde_json::from_str(source)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn functions(&self) -> impl Iterator<Item = &IrFunction> {
        self.items.iter().filter_map(|item| match item {
            IrItem::Function(f) => Some(f),
            IrItem::Constant { .. } => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_function_item() {
        let src = r#"{
            "items": [
                { "item": "function",
                  "external_name": "tvmgen_default_my_ts_mean_0",
                  "kernel": "my_ts_mean",
                  "params": [
                    { "name": "data", "shape": [10], "dtype": "float32" },
                    { "name": "window", "shape": [1], "dtype": "int32" }
                  ] }
            ]
        }"#;
        let module = IrModule::from_json(src).unwrap();
        let funcs: Vec<_> = module.functions().collect();
        assert_eq!(funcs.len(), 1);
        assert_eq!(
            funcs[0].external_name.as_deref(),
            Some("tvmgen_default_my_ts_mean_0")
        );
        assert_eq!(funcs[0].kernel.as_deref(), Some("my_ts_mean"));
        assert_eq!(funcs[0].params[1].dtype, DType::Int32);
    }

    #[test]
    fn test_missing_name_parses_as_none() {
        let src = r#"{"items": [{"item": "function", "params": []}]}"#;
        let module = IrModule::from_json(src).unwrap();
        assert!(module.functions().next().unwrap().external_name.is_none());
    }

    #[test]
    fn test_constant_item() {
        let src = r#"{"items": [{"item": "constant", "name": "w0", "dtype": "float64"}]}"#;
        let module = IrModule::from_json(src).unwrap();
        assert_eq!(module.items[0].kind_name(), "constant");
        assert_eq!(module.functions().count(), 0);
    }

    #[test]
    fn test_unknown_dtype_rejected() {
        let src = r#"{"items": [{"item": "function", "params": [
            {"name": "x", "shape": [1], "dtype": "bfloat16"}]}]}"#;
        assert!(IrModule::from_json(src).is_err());
    }

    #[test]
    fn test_builder_round_trips_through_json() {
        let module = IrModule::new().with_function(
            IrFunction::new("fma_0")
                .with_kernel("multiply_add")
                .param("a", &[4], DType::Float32),
        );
        let back = IrModule::from_json(&module.to_json().unwrap()).unwrap();
        assert_eq!(back, module);
    }

    #[test]
    fn test_dynamic_extent() {
        let p: Param =
            serde_json::from_str(r#"{"name": "x", "shape": ["?", 4], "dtype": "float32"}"#).unwrap();
        assert_eq!(p.shape, vec![-1, 4]);
        assert!(p.is_dynamic());
        let bad = r#"{"name": "x", "shape": ["n"], "dtype": "float32"}"#;
        assert!(serde_json::from_str::<Param>(bad).is_err());
    }

    #[test]
    fn test_param_helpers() {
        let p = Param::new("x", &[-1, 3], DType::Float64);
        assert_eq!(p.rank(), 2);
        assert!(p.is_dynamic());
        assert_eq!(DType::Float64.c_type(), "double");
        assert_eq!(DType::Int32.dl_code(), "kDLInt");
        assert_eq!(DType::Float32.bits(), 32);
    }
}
