use sluice_llm::{
    classify, Message, ModelDescriptor, ModelSelector, OpenAIClient, ProviderClientOptions,
    ProviderVariant, ReasoningEffort, TokenLimit,
};

struct Case {
    name: &'static str,
    base_url: &'static str,
    can_reason: bool,
    expect_completion_tokens: bool,
}

fn client(base_url: &str, can_reason: bool) -> OpenAIClient {
    let options = ProviderClientOptions::builder()
        .base_url(base_url)
        .api_key("test-key")
        .api_version("2024-10-21")
        .model(ModelSelector::fixed(
            ModelDescriptor::new("test-model", 4096).reasoning(can_reason),
        ))
        .build()
        .unwrap();
    OpenAIClient::new(options).unwrap()
}

#[test]
fn test_prepared_params_provider_aware() {
    let cases = [
        Case {
            name: "Azure OpenAI non-reasoning uses max_completion_tokens",
            base_url: "https://test.openai.azure.com",
            can_reason: false,
            expect_completion_tokens: true,
        },
        Case {
            name: "Azure OpenAI reasoning uses max_completion_tokens",
            base_url: "https://test.openai.azure.com",
            can_reason: true,
            expect_completion_tokens: true,
        },
        Case {
            name: "Cognitive Services non-reasoning uses max_completion_tokens",
            base_url: "https://my-custom-name.cognitiveservices.azure.com",
            can_reason: false,
            expect_completion_tokens: true,
        },
        Case {
            name: "OpenAI non-reasoning uses max_tokens",
            base_url: "https://api.openai.com/v1",
            can_reason: false,
            expect_completion_tokens: false,
        },
        Case {
            name: "OpenAI reasoning uses max_completion_tokens",
            base_url: "https://api.openai.com/v1",
            can_reason: true,
            expect_completion_tokens: true,
        },
        Case {
            name: "Custom endpoint non-reasoning uses max_tokens",
            base_url: "https://custom-api.example.com/v1",
            can_reason: false,
            expect_completion_tokens: false,
        },
    ];

    for case in cases {
        let client = client(case.base_url, case.can_reason);
        let model = client.options().selected_model();
        let params = client
            .prepared_params(&model, &[Message::user("Hello")], &[])
            .unwrap();

        if case.expect_completion_tokens {
            assert_eq!(params.max_completion_tokens, Some(4096), "{}", case.name);
            assert_eq!(params.max_tokens, None, "{}", case.name);
        } else {
            assert_eq!(params.max_tokens, Some(4096), "{}", case.name);
            assert_eq!(params.max_completion_tokens, None, "{}", case.name);
        }

        let json = serde_json::to_value(&params).unwrap();
        let (present, absent) = if case.expect_completion_tokens {
            ("max_completion_tokens", "max_tokens")
        } else {
            ("max_tokens", "max_completion_tokens")
        };
        assert!(json.get(present).is_some(), "{}", case.name);
        assert!(json.get(absent).is_none(), "{}", case.name);
    }
}

#[test]
fn test_variant_drives_token_limit() {
    for (url, variant) in [
        ("https://api.openai.com/v1", ProviderVariant::Standard),
        ("https://res.openai.azure.com", ProviderVariant::AzureOpenAI),
        ("https://res.cognitiveservices.azure.com", ProviderVariant::AzureCognitiveServices),
    ] {
        assert_eq!(classify(url), variant);
        let expected = if variant.is_azure() {
            TokenLimit::MaxCompletionTokens(100)
        } else {
            TokenLimit::MaxTokens(100)
        };
        assert_eq!(TokenLimit::select(variant, false, 100), expected, "{}", url);
    }
}

#[test]
fn test_options_override_budget_and_effort() {
    let options = ProviderClientOptions::builder()
        .base_url("https://api.openai.com/v1")
        .model(ModelSelector::fixed(
            ModelDescriptor::new("o3-mini", 4096).reasoning(true),
        ))
        .max_tokens(512)
        .reasoning_effort(ReasoningEffort::High)
        .extra_body("user", serde_json::json!("abc"))
        .build()
        .unwrap();
    let client = OpenAIClient::new(options).unwrap();
    let model = client.options().selected_model();

    let params = client
        .prepared_params(&model, &[Message::user("Hi")], &[])
        .unwrap();
    assert_eq!(params.token_limit(), Some(TokenLimit::MaxCompletionTokens(512)));
    assert_eq!(params.reasoning_effort, Some(ReasoningEffort::High));

    let json = serde_json::to_value(&params).unwrap();
    assert_eq!(json["reasoning_effort"], "high");
    assert_eq!(json["user"], "abc");
}

#[test]
fn test_system_message_is_prepended() {
    let options = ProviderClientOptions::builder()
        .system_message("You are terse.")
        .model(ModelSelector::fixed(ModelDescriptor::new("gpt-4o", 1000)))
        .build()
        .unwrap();
    let client = OpenAIClient::new(options).unwrap();
    let model = client.options().selected_model();

    let params = client
        .prepared_params(&model, &[Message::user("Hi")], &[])
        .unwrap();
    assert_eq!(params.messages.len(), 2);
    assert_eq!(params.messages[0].text_content().as_deref(), Some("You are terse."));
    assert_eq!(params.messages[1].text_content().as_deref(), Some("Hi"));
}
