//! Step parameter enum, object-safe codec wrapper, and codec registry.
//!
//! [`StepCodec`] is static: its parameter type is an associated type. Callers that
//! only learn the step kind at runtime (the CLI, a step picker) go through
//! [`CodecRegistry`] instead, which works on [`StepParams`].

use std::collections::HashMap;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

use pipesync_types::{DataframeContext, Result, StepKind, SyncError};

use crate::codec::StepCodec;
use crate::steps::*;

// ---------------------------------------------------------------------------
// StepParams
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "params", rename_all = "snake_case")]
pub enum StepParams {
    ReadCsv(ReadCsvParams),
    Split(SplitParams),
    FeaturesTarget(FeaturesTargetParams),
    Inspection(InspectionParams),
    Clean(CleanParams),
    LinearRegression(LinearRegressionParams),
}

impl StepParams {
    pub fn kind(&self) -> StepKind {
        match self {
            StepParams::ReadCsv(_) => StepKind::ReadCsv,
            StepParams::Split(_) => StepKind::Split,
            StepParams::FeaturesTarget(_) => StepKind::FeaturesTarget,
            StepParams::Inspection(_) => StepKind::Inspection,
            StepParams::Clean(_) => StepKind::Clean,
            StepParams::LinearRegression(_) => StepKind::LinearRegression,
        }
    }
}

/// Conversion between a codec's own parameter struct and [`StepParams`].
pub trait ParamsVariant: Sized {
    fn into_step(self) -> StepParams;
    fn from_step(params: &StepParams) -> Option<&Self>;
}

macro_rules! params_variant {
    ($ty:ty, $variant:ident) => {
        impl ParamsVariant for $ty {
            fn into_step(self) -> StepParams {
                StepParams::$variant(self)
            }

            fn from_step(params: &StepParams) -> Option<&Self> {
                match params {
                    StepParams::$variant(p) => Some(p),
                    _ => None,
                }
            }
        }

        impl From<$ty> for StepParams {
            fn from(params: $ty) -> Self {
                StepParams::$variant(params)
            }
        }
    };
}

params_variant!(ReadCsvParams, ReadCsv);
params_variant!(SplitParams, Split);
params_variant!(FeaturesTargetParams, FeaturesTarget);
params_variant!(InspectionParams, Inspection);
params_variant!(CleanParams, Clean);
params_variant!(LinearRegressionParams, LinearRegression);

// ---------------------------------------------------------------------------
// DynCodec: object-safe wrapper
// ---------------------------------------------------------------------------

trait ErasedCodec: Send + Sync {
    fn kind(&self) -> StepKind;
    fn default_params(&self) -> StepParams;
    fn generate(&self, params: &StepParams) -> Result<String>;
    fn parse(&self, source: &str, current: &StepParams) -> Result<Option<StepParams>>;
    fn normalize(&self, parsed: &StepParams, before: &StepParams) -> Result<StepParams>;
    fn context(&self, params: &StepParams) -> Result<DataframeContext>;
    fn params_from_json(&self, value: serde_json::Value) -> Result<StepParams>;
}

struct Erased<C>(PhantomData<fn() -> C>);

impl<C> Erased<C>
where
    C: StepCodec,
    C::Params: ParamsVariant,
{
    fn downcast<'a>(&self, params: &'a StepParams) -> Result<&'a C::Params> {
        C::Params::from_step(params).ok_or_else(|| SyncError::InvalidParams {
            step: C::KIND.to_string(),
            message: format!("got parameters for '{}'", params.kind()),
        })
    }
}

impl<C> ErasedCodec for Erased<C>
where
    C: StepCodec,
    C::Params: ParamsVariant,
{
    fn kind(&self) -> StepKind {
        C::KIND
    }

    fn default_params(&self) -> StepParams {
        C::Params::default().into_step()
    }

    fn generate(&self, params: &StepParams) -> Result<String> {
        Ok(C::generate(self.downcast(params)?))
    }

    fn parse(&self, source: &str, current: &StepParams) -> Result<Option<StepParams>> {
        let current = self.downcast(current)?;
        Ok(C::parse(source, current).map(ParamsVariant::into_step))
    }

    fn normalize(&self, parsed: &StepParams, before: &StepParams) -> Result<StepParams> {
        let parsed = self.downcast(parsed)?.clone();
        let before = self.downcast(before)?;
        Ok(C::normalize(parsed, before).into_step())
    }

    fn context(&self, params: &StepParams) -> Result<DataframeContext> {
        Ok(C::context(self.downcast(params)?))
    }

    fn params_from_json(&self, value: serde_json::Value) -> Result<StepParams> {
        let params: C::Params = serde_json::from_value(value)?;
        Ok(params.into_step())
    }
}

pub struct DynCodec(Box<dyn ErasedCodec>);

impl DynCodec {
    pub fn new<C>() -> Self
    where
        C: StepCodec + 'static,
        C::Params: ParamsVariant,
    {
        Self(Box::new(Erased::<C>(PhantomData)))
    }

    pub fn kind(&self) -> StepKind {
        self.0.kind()
    }

    pub fn default_params(&self) -> StepParams {
        self.0.default_params()
    }

    pub fn generate(&self, params: &StepParams) -> Result<String> {
        self.0.generate(params)
    }

    pub fn parse(&self, source: &str, current: &StepParams) -> Result<Option<StepParams>> {
        self.0.parse(source, current)
    }

    pub fn parse_default(&self, source: &str) -> Option<StepParams> {
        self.0
            .parse(source, &self.0.default_params())
            .ok()
            .flatten()
    }

    pub fn normalize(&self, parsed: &StepParams, before: &StepParams) -> Result<StepParams> {
        self.0.normalize(parsed, before)
    }

    pub fn context(&self, params: &StepParams) -> Result<DataframeContext> {
        self.0.context(params)
    }

    /// Deserialize this kind's parameters; missing fields take their defaults.
    pub fn params_from_json(&self, value: serde_json::Value) -> Result<StepParams> {
        self.0.params_from_json(value)
    }
}

// ---------------------------------------------------------------------------
// CodecRegistry
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct CodecRegistry {
    codecs: HashMap<StepKind, DynCodec>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<C>(&mut self)
    where
        C: StepCodec + 'static,
        C::Params: ParamsVariant,
    {
        self.codecs.insert(C::KIND, DynCodec::new::<C>());
    }

    pub fn get(&self, kind: StepKind) -> Option<&DynCodec> {
        self.codecs.get(&kind)
    }

    /// Like [`get`](Self::get), failing with `UnknownStepKind`.
    pub fn require(&self, kind: StepKind) -> Result<&DynCodec> {
        self.get(kind)
            .ok_or_else(|| SyncError::UnknownStepKind(kind.to_string()))
    }

    pub fn has(&self, kind: StepKind) -> bool {
        self.codecs.contains_key(&kind)
    }

    /// Registered kinds in declaration order.
    pub fn kinds(&self) -> Vec<StepKind> {
        let mut kinds: Vec<StepKind> = self.codecs.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

// ---------------------------------------------------------------------------
// Default registry factory
// ---------------------------------------------------------------------------

pub fn default_registry() -> CodecRegistry {
    let mut reg = CodecRegistry::new();
    reg.register::<ReadCsvCodec>();
    reg.register::<SplitCodec>();
    reg.register::<FeaturesTargetCodec>();
    reg.register::<InspectionCodec>();
    reg.register::<CleanCodec>();
    reg.register::<LinearRegressionCodec>();
    reg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_covers_every_kind() {
        let reg = default_registry();
        assert_eq!(reg.kinds(), StepKind::ALL.to_vec());
        for kind in StepKind::ALL {
            let codec = reg.require(kind).unwrap();
            assert_eq!(codec.kind(), kind);
            assert_eq!(codec.default_params().kind(), kind);
        }
    }

    #[test]
    fn dynamic_generate_matches_static() {
        let reg = default_registry();
        let params = ReadCsvParams::default();
        let dynamic = reg
            .require(StepKind::ReadCsv)
            .unwrap()
            .generate(&params.clone().into())
            .unwrap();
        assert_eq!(dynamic, ReadCsvCodec::generate(&params));
    }

    #[test]
    fn mismatched_params_are_rejected() {
        let reg = default_registry();
        let err = reg
            .require(StepKind::Split)
            .unwrap()
            .generate(&StepParams::ReadCsv(ReadCsvParams::default()))
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidParams { .. }));
        assert!(err.to_string().contains("read_csv"));
    }

    #[test]
    fn params_from_json_fills_defaults() {
        let reg = default_registry();
        let params = reg
            .require(StepKind::Split)
            .unwrap()
            .params_from_json(serde_json::json!({ "source_var": "clean" }))
            .unwrap();
        match params {
            StepParams::Split(p) => {
                assert_eq!(p.source_var, "clean");
                assert_eq!(p.train_percent, 80);
            }
            other => panic!("unexpected params: {other:?}"),
        }
    }

    #[test]
    fn step_params_serialize_with_kind_tag() {
        let json = serde_json::to_value(StepParams::from(InspectionParams::default())).unwrap();
        assert_eq!(json["kind"], "inspection");
        assert_eq!(json["params"]["head_rows"], 5);
    }

    #[test]
    fn dynamic_parse_and_normalize_split() {
        let reg = default_registry();
        let codec = reg.require(StepKind::Split).unwrap();
        let before = codec.default_params();
        let source = codec.generate(&before).unwrap().replace("0.80", "0.90");
        let parsed = codec.parse(&source, &before).unwrap().unwrap();
        let settled = codec.normalize(&parsed, &before).unwrap();
        match settled {
            StepParams::Split(p) => assert_eq!((p.train_percent, p.test_percent), (90, 10)),
            other => panic!("unexpected params: {other:?}"),
        }
        assert_eq!(codec.parse_default("nothing here"), None);
    }
}
