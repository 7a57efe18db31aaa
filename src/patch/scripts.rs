//! JavaScript override script generation.
//!
//! Each function renders the script body for one directive. Scripts are
//! self-contained IIFEs or single statements; the engine decides ordering,
//! the scripts only encode the override itself.

use crate::profile::StealthProfile;

/// Escape a string for embedding in a JS double-quoted literal.
pub(crate) fn escape_js_string(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}

/// Getter-based override of one navigator property.
pub(crate) fn navigator_getter(prop: &str, js_value: &str) -> String {
    format!(
        r#"Object.defineProperty(navigator, '{prop}', {{
    get: function() {{ return {js_value}; }},
    configurable: true
}});"#
    )
}

/// Getter-based override of one screen property.
pub(crate) fn screen_getter(prop: &str, value: u32) -> String {
    format!(
        r#"Object.defineProperty(screen, '{prop}', {{
    get: function() {{ return {value}; }},
    configurable: true
}});"#
    )
}

/// The webdriver flag, hidden on the instance and the prototype.
///
/// Detectors read this synchronously on the very first tick, so the script
/// is minimal: delete, then redefine as an undefined-returning getter.
pub(crate) fn webdriver_script() -> String {
    r#"(function() {
    try { delete navigator.webdriver; } catch (e) {}
    Object.defineProperty(navigator, 'webdriver', {
        get: function() { return undefined; },
        configurable: true,
        enumerable: false
    });
    try {
        Object.defineProperty(Navigator.prototype, 'webdriver', {
            get: function() { return undefined; },
            configurable: true,
            enumerable: false
        });
    } catch (e) {}
})();"#
        .to_string()
}

/// Removal of automation-framework globals and error-stack scrubbing.
pub(crate) fn automation_markers_script() -> String {
    r#"(function() {
    var markers = [
        'cdc_adoQpoasnfa76pfcZLmcfl_Array',
        'cdc_adoQpoasnfa76pfcZLmcfl_Promise',
        'cdc_adoQpoasnfa76pfcZLmcfl_Symbol',
        '$cdc_asdjflasutopfhvcZLmcfl_',
        '_selenium', 'callSelenium', '_Selenium_IDE_Recorder',
        '__webdriver_script_fn', '__driver_evaluate', '__webdriver_evaluate',
        '__selenium_evaluate', '__fxdriver_evaluate', '__driver_unwrapped',
        '__webdriver_unwrapped', '__selenium_unwrapped', '__fxdriver_unwrapped',
        '__webdriver_script_func', '$chrome_asyncScriptInfo',
        'callPhantom', '_phantom', '__nightmare',
        'domAutomation', 'domAutomationController'
    ];
    for (var i = 0; i < markers.length; i++) {
        try { delete window[markers[i]]; } catch (e) {}
    }

    var OriginalError = Error;
    var CleanError = function() {
        var error = new (Function.prototype.bind.apply(
            OriginalError, [null].concat(Array.prototype.slice.call(arguments))));
        if (error.stack) {
            error.stack = error.stack
                .split('\n')
                .filter(function(line) {
                    return line.indexOf('webdriver') === -1 &&
                           line.indexOf('puppeteer') === -1 &&
                           line.indexOf('playwright') === -1;
                })
                .join('\n');
        }
        return error;
    };
    CleanError.prototype = OriginalError.prototype;
    CleanError.captureStackTrace = OriginalError.captureStackTrace;
    window.Error = CleanError;
})();"#
        .to_string()
}

/// Synthesizes the `window.chrome` namespace headless builds omit.
pub(crate) fn chrome_namespace_script() -> String {
    r#"(function() {
    if (!window.chrome) {
        Object.defineProperty(window, 'chrome', {
            value: {
                runtime: {},
                loadTimes: function() { return {}; },
                csi: function() { return {}; }
            },
            writable: true,
            configurable: true
        });
    }
})();"#
        .to_string()
}

/// Ordered languages list plus the derived primary language.
pub(crate) fn languages_script(languages: &[String]) -> String {
    let entries: Vec<String> = languages
        .iter()
        .map(|l| format!("\"{}\"", escape_js_string(l)))
        .collect();
    format!(
        r#"(function() {{
    var LANGUAGES = [{langs}];
    Object.defineProperty(navigator, 'languages', {{
        get: function() {{ return Object.freeze(LANGUAGES.slice()); }},
        configurable: true
    }});
    Object.defineProperty(navigator, 'language', {{
        get: function() {{ return LANGUAGES[0]; }},
        configurable: true
    }});
}})();"#,
        langs = entries.join(", ")
    )
}

/// Timezone offset override as `getTimezoneOffset` reports it.
pub(crate) fn timezone_script(offset_minutes: i32) -> String {
    format!(
        r#"Date.prototype.getTimezoneOffset = function() {{ return {offset_minutes}; }};"#
    )
}

/// Chrome-shaped plugin and mimeTypes surface. Headless runtimes expose an
/// empty PluginArray, which is itself a detection signal.
pub(crate) fn plugins_script() -> String {
    r#"(function() {
    var names = ['PDF Viewer', 'Chrome PDF Viewer', 'Chromium PDF Viewer',
                 'Microsoft Edge PDF Viewer', 'WebKit built-in PDF'];
    var plugins = [];
    for (var i = 0; i < names.length; i++) {
        var plugin = Object.create(Plugin.prototype);
        Object.defineProperties(plugin, {
            'name': { value: names[i], enumerable: true },
            'description': { value: 'Portable Document Format', enumerable: true },
            'filename': { value: 'internal-pdf-viewer', enumerable: true },
            'length': { value: 1, enumerable: true }
        });
        plugins.push(plugin);
    }
    var pluginArray = Object.create(PluginArray.prototype);
    plugins.forEach(function(plugin, i) {
        Object.defineProperty(pluginArray, i, { value: plugin, enumerable: true });
        Object.defineProperty(pluginArray, plugin.name, { value: plugin, enumerable: false });
    });
    Object.defineProperty(pluginArray, 'length', { value: plugins.length, enumerable: true });
    pluginArray.item = function(i) { return plugins[i] || null; };
    pluginArray.namedItem = function(name) {
        return plugins.filter(function(p) { return p.name === name; })[0] || null;
    };
    pluginArray.refresh = function() {};
    Object.defineProperty(navigator, 'plugins', {
        get: function() { return pluginArray; },
        configurable: true
    });
})();"#
        .to_string()
}

/// Canvas read-back wrapper.
///
/// Every `getImageData`/`toDataURL` read is perturbed within the amplitude
/// bound and a per-context tick forces one least-significant step on a
/// rotating channel, so repeated reads of an unchanged canvas never hash
/// equal. The step direction is picked against the channel's own delta so
/// the total never leaves the amplitude bound.
pub(crate) fn canvas_noise_script(amplitude: u8) -> String {
    format!(
        r#"(function() {{
    var AMP = {amplitude};
    var tick = 0;
    var perturb = function(data) {{
        if (data.length === 0) return;
        tick = (tick + 1) >>> 0;
        var j = tick % data.length;
        var deltaAtJ = 0;
        for (var i = 0; i < data.length; i++) {{
            var d = ((Math.random() * (2 * AMP + 1)) | 0) - AMP;
            var v = data[i] + d;
            v = v < 0 ? 0 : (v > 255 ? 255 : v);
            if (i === j) deltaAtJ = v - data[i];
            data[i] = v;
        }}
        if (deltaAtJ >= AMP) data[j] -= 1;
        else if (deltaAtJ <= -AMP) data[j] += 1;
        else if (data[j] >= 255) data[j] -= 1;
        else data[j] += 1;
    }};
    var origGetImageData = CanvasRenderingContext2D.prototype.getImageData;
    CanvasRenderingContext2D.prototype.getImageData = function() {{
        var image = origGetImageData.apply(this, arguments);
        perturb(image.data);
        return image;
    }};
    var origToDataURL = HTMLCanvasElement.prototype.toDataURL;
    HTMLCanvasElement.prototype.toDataURL = function() {{
        var ctx = this.getContext('2d');
        if (ctx) {{
            try {{
                var image = origGetImageData.call(ctx, 0, 0, this.width, this.height);
                perturb(image.data);
                ctx.putImageData(image, 0, 0);
            }} catch (e) {{}}
        }}
        return origToDataURL.apply(this, arguments);
    }};
}})();"#
    )
}

/// Text-metrics jitter; exact glyph widths are a font-fingerprint signal.
pub(crate) fn text_metrics_script() -> String {
    r#"(function() {
    var origMeasureText = CanvasRenderingContext2D.prototype.measureText;
    CanvasRenderingContext2D.prototype.measureText = function(text) {
        var metrics = origMeasureText.call(this, text);
        var noise = (Math.random() - 0.5) * 0.00002;
        var width = metrics.width + noise;
        Object.defineProperty(metrics, 'width', {
            get: function() { return width; },
            configurable: true
        });
        return metrics;
    };
})();"#
        .to_string()
}

/// Audio sample wrapper, clamped to the legal [-1, 1] range.
///
/// The repeat-defeating nudge moves one rotating sample by half the
/// amplitude, in the direction that keeps the sample's total delta inside
/// the amplitude bound.
pub(crate) fn audio_noise_script(amplitude: f64) -> String {
    format!(
        r#"(function() {{
    var AMP = {amplitude};
    var STEP = AMP / 2;
    var tick = 0;
    var origGetChannelData = AudioBuffer.prototype.getChannelData;
    AudioBuffer.prototype.getChannelData = function(channel) {{
        var data = origGetChannelData.call(this, channel);
        if (data.length === 0) return data;
        tick = (tick + 1) >>> 0;
        var j = tick % data.length;
        var deltaAtJ = 0;
        for (var i = 0; i < data.length; i++) {{
            var v = data[i] + (Math.random() * 2 - 1) * AMP;
            v = v < -1 ? -1 : (v > 1 ? 1 : v);
            if (i === j) deltaAtJ = v - data[i];
            data[i] = v;
        }}
        if (deltaAtJ >= STEP || data[j] + STEP > 1) data[j] -= STEP;
        else data[j] += STEP;
        return data;
    }};
}})();"#
    )
}

/// WebGL parameter spoofing for one rendering-context constructor.
///
/// 37445/37446 are UNMASKED_VENDOR_WEBGL and UNMASKED_RENDERER_WEBGL from
/// the WEBGL_debug_renderer_info extension.
pub(crate) fn webgl_parameter_script(ctor: &str, vendor: &str, renderer: &str) -> String {
    format!(
        r#"(function() {{
    var VENDOR = "{vendor}";
    var RENDERER = "{renderer}";
    var origGetParameter = {ctor}.prototype.getParameter;
    {ctor}.prototype.getParameter = function(parameter) {{
        if (parameter === 37445) return VENDOR;
        if (parameter === 37446) return RENDERER;
        return origGetParameter.call(this, parameter);
    }};
}})();"#,
        vendor = escape_js_string(vendor),
        renderer = escape_js_string(renderer),
        ctor = ctor
    )
}

/// Final lock-in: re-asserts the highest-risk properties non-configurable.
///
/// The hosting automation framework may reassert its own values after the
/// first pass; this runs last and wins any later write attempt.
pub(crate) fn lock_in_script(profile: &StealthProfile) -> String {
    format!(
        r#"(function() {{
    try {{ delete navigator.platform; }} catch (e) {{}}
    Object.defineProperty(navigator, 'platform', {{
        get: function() {{ return "{platform}"; }},
        configurable: false,
        enumerable: true
    }});
    try {{ delete navigator.webdriver; }} catch (e) {{}}
    Object.defineProperty(navigator, 'webdriver', {{
        get: function() {{ return undefined; }},
        configurable: false,
        enumerable: false
    }});
}})();"#,
        platform = escape_js_string(profile.platform())
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_js_metacharacters() {
        assert_eq!(escape_js_string(r#"a"b\c"#), r#"a\"b\\c"#);
        assert_eq!(escape_js_string("line\nbreak"), "line\\nbreak");
    }

    #[test]
    fn webdriver_script_returns_undefined() {
        let js = webdriver_script();
        assert!(js.contains("return undefined"));
        assert!(js.contains("Navigator.prototype"));
        assert!(!js.contains("return true"));
    }

    #[test]
    fn canvas_script_embeds_amplitude_and_forces_tick() {
        let js = canvas_noise_script(2);
        assert!(js.contains("var AMP = 2"));
        assert!(js.contains("tick"));
        assert!(js.contains("getImageData"));
        assert!(js.contains("toDataURL"));
        // The forced step direction depends on the channel's own delta, so
        // the total can never exceed the amplitude.
        assert!(js.contains("if (deltaAtJ >= AMP) data[j] -= 1;"));
        assert!(js.contains("else if (deltaAtJ <= -AMP) data[j] += 1;"));
    }

    #[test]
    fn audio_script_nudges_within_the_amplitude() {
        let js = audio_noise_script(1e-4);
        assert!(js.contains("var STEP = AMP / 2"));
        assert!(js.contains("if (deltaAtJ >= STEP || data[j] + STEP > 1) data[j] -= STEP;"));
        assert!(js.contains("getChannelData"));
    }

    #[test]
    fn webgl_script_spoofs_unmasked_parameters() {
        let js = webgl_parameter_script(
            "WebGLRenderingContext",
            "Google Inc. (Intel)",
            "ANGLE (Intel, Intel(R) UHD Graphics 630 Direct3D11 vs_5_0 ps_5_0, D3D11)",
        );
        assert!(js.contains("37445"));
        assert!(js.contains("37446"));
        assert!(js.contains("WebGLRenderingContext.prototype.getParameter"));
    }

    #[test]
    fn lock_in_is_non_configurable() {
        let profile = crate::profile::StealthProfile::windows_chrome();
        let js = lock_in_script(&profile);
        assert!(js.contains("configurable: false"));
        assert!(js.contains("Win32"));
    }
}
