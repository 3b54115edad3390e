use crate::protocol::canonical::OutputLanguage;

/// User-facing explanations for streams that end without usable text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Notice {
    ContentFiltered,
    NothingReceived,
    InputTooLarge,
    EmptyResult,
    Malformed,
    Interrupted,
    TimedOut,
}

impl Notice {
    pub(crate) fn text(self, language: OutputLanguage) -> &'static str {
        match (self, language) {
            (Notice::ContentFiltered, OutputLanguage::En) => {
                "The model blocked this request for safety reasons. Please rephrase the prompt and try again."
            }
            (Notice::ContentFiltered, OutputLanguage::Zh) => {
                "模型因安全策略拦截了本次请求，请调整提示词后重试。"
            }
            (Notice::NothingReceived, OutputLanguage::En) => {
                "The upstream model closed the connection without sending any data. Please check the network and retry."
            }
            (Notice::NothingReceived, OutputLanguage::Zh) => {
                "上游模型未返回任何数据即断开连接，请检查网络后重试。"
            }
            (Notice::InputTooLarge, OutputLanguage::En) => {
                "The input is too large: the model hit its output limit before producing a prompt. Try a shorter prompt or a smaller image."
            }
            (Notice::InputTooLarge, OutputLanguage::Zh) => {
                "输入内容过大，模型在生成结果前已达到输出上限。请缩短提示词或压缩图片。"
            }
            (Notice::EmptyResult, OutputLanguage::En) => {
                "The model returned no text. The content may have been filtered; please try rephrasing the prompt."
            }
            (Notice::EmptyResult, OutputLanguage::Zh) => {
                "模型没有返回任何文本，内容可能被过滤，请尝试修改提示词。"
            }
            (Notice::Malformed, OutputLanguage::En) => {
                "The upstream response could not be parsed."
            }
            (Notice::Malformed, OutputLanguage::Zh) => "无法解析上游返回的数据。",
            (Notice::Interrupted, OutputLanguage::En) => {
                "The connection to the upstream model was interrupted."
            }
            (Notice::Interrupted, OutputLanguage::Zh) => "与上游模型的连接中断。",
            (Notice::TimedOut, OutputLanguage::En) => {
                "The upstream model stopped responding in time."
            }
            (Notice::TimedOut, OutputLanguage::Zh) => "上游模型响应超时。",
        }
    }
}
