//! End-to-end conversion: source bytes, through the IR, to target bytes.

use crate::error::{ConvertError, GenerateError, ParseError};
use crate::ir::UnifiedDsl;
use crate::platform::{DslGenerator, DslParser, Platform};
use crate::platforms::{
    CozeGenerator, CozeParser, DifyGenerator, DifyParser, GeneratorOptions, IFlytekGenerator,
    IFlytekParser, UnifiedFormat,
};

/// The parser for documents of `platform`.
pub fn parser_for(platform: Platform) -> Box<dyn DslParser> {
    match platform {
        Platform::IFlytek => Box::new(IFlytekParser),
        Platform::Dify => Box::new(DifyParser),
        Platform::Coze => Box::new(CozeParser),
        Platform::Unified => Box::new(UnifiedFormat),
    }
}

pub fn generator_for(platform: Platform, options: GeneratorOptions) -> Box<dyn DslGenerator> {
    match platform {
        Platform::IFlytek => Box::new(IFlytekGenerator::new(options)),
        Platform::Dify => Box::new(DifyGenerator::new(options)),
        Platform::Coze => Box::new(CozeGenerator::new(options)),
        Platform::Unified => Box::new(UnifiedFormat),
    }
}

pub fn detect(bytes: &[u8]) -> Result<Platform, ParseError> {
    Platform::detect(bytes)
}

pub struct Converter {
    from: Option<Platform>,
    to: Platform,
    options: GeneratorOptions,
}

pub struct ConverterBuilder {
    from: Option<Platform>,
    to: Platform,
    options: GeneratorOptions,
}

impl ConverterBuilder {
    /// `from = None` detects the source platform from each input.
    pub fn new(from: impl Into<Option<Platform>>, to: Platform) -> Self {
        Self {
            from: from.into(),
            to,
            options: GeneratorOptions::default(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.options.seed = seed;
        self
    }

    pub fn with_counter_base(mut self, base: u64) -> Self {
        self.options.counter_base = Some(base);
        self
    }

    pub fn with_timestamp_base(mut self, millis: u64) -> Self {
        self.options.timestamp_base = Some(millis);
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.options.max_attempts = attempts;
        self
    }

    pub fn with_archive(mut self, archive: bool) -> Self {
        self.options.archive = archive;
        self
    }

    pub fn with_options(mut self, options: GeneratorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> Converter {
        Converter {
            from: self.from,
            to: self.to,
            options: self.options,
        }
    }
}

impl Converter {
    pub fn builder(from: impl Into<Option<Platform>>, to: Platform) -> ConverterBuilder {
        ConverterBuilder::new(from, to)
    }

    /// A converter that detects the source platform of every input.
    pub fn detecting(to: Platform) -> ConverterBuilder {
        ConverterBuilder::new(None, to)
    }

    pub fn target(&self) -> Platform {
        self.to
    }

    pub fn options(&self) -> &GeneratorOptions {
        &self.options
    }

    /// The configured source platform, or the detected one.
    pub fn source_of(&self, bytes: &[u8]) -> Result<Platform, ParseError> {
        match self.from {
            Some(platform) => Ok(platform),
            None => detect(bytes),
        }
    }

    pub fn parse(&self, bytes: &[u8]) -> Result<UnifiedDsl, ParseError> {
        let source = self.source_of(bytes)?;
        let dsl = parser_for(source).parse(bytes)?;
        tracing::debug!(
            platform = %source,
            nodes = dsl.workflow.nodes.len(),
            edges = dsl.workflow.edges.len(),
            "parsed source document"
        );
        Ok(dsl)
    }

    pub fn generate(&self, dsl: &UnifiedDsl) -> Result<Vec<u8>, GenerateError> {
        generator_for(self.to, self.options).generate(dsl)
    }

    pub fn convert(&self, bytes: &[u8]) -> Result<Vec<u8>, ConvertError> {
        let dsl = self.parse(bytes)?;
        let output = self.generate(&dsl)?;
        tracing::info!(
            from = ?dsl.metadata.source_platform,
            to = %self.to,
            workflow = %dsl.metadata.name,
            bytes = output.len(),
            "converted workflow"
        );
        Ok(output)
    }
}
