// Configuration for the ask CLI

#[derive(Debug, Clone)]
pub struct Config {
    pub ollama_base_url: String,
    pub opentts_base_url: String,
    pub llm_model: String,
    pub default_voice: String,
    pub output_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ollama_base_url: "http://localhost:11434".to_string(),
            opentts_base_url: "http://localhost:5500".to_string(),
            llm_model: "llama3:70b".to_string(),
            default_voice: "coqui-tts:en_ljspeech".to_string(),
            output_dir: "ai_output".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let ollama_base_url =
            std::env::var("ASK_OLLAMA_BASEURL").unwrap_or(defaults.ollama_base_url);

        let opentts_base_url =
            std::env::var("ASK_OPENTTS_BASEURL").unwrap_or(defaults.opentts_base_url);

        let llm_model = std::env::var("ASK_LLM_MODEL").unwrap_or(defaults.llm_model);

        let default_voice = std::env::var("ASK_DEFAULT_VOICE").unwrap_or(defaults.default_voice);

        let output_dir = std::env::var("ASK_OUTPUT_DIR").unwrap_or(defaults.output_dir);

        Self {
            ollama_base_url,
            opentts_base_url,
            llm_model,
            default_voice,
            output_dir,
        }
    }
}
