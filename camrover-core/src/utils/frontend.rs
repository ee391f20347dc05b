//! Control page served at `/`.
//!
//! The stream is loaded from the stream server one port above the page's own.

pub(crate) const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta name="viewport" content="width=device-width, initial-scale=1.0, maximum-scale=1.0, user-scalable=0">
<title>Camera Rover</title>
<style>
body { background-color: #FFFFFF; font-family: sans-serif; }
button { color: white; margin: 5px; border: none; }
.bottom-container { display: flex; align-items: center; justify-content: center; }
.bottom-container img { margin-right: 10px; }
</style>
<script src="/joy.min.js"></script>
</head>
<body>
<div style="text-align:center;">
  <img id="stream" src="" style="width:400px;" crossorigin="anonymous">
</div>
<div id="joystickDiv" style="width:200px;height:200px;margin:0 auto;"></div>
<p align="center">
  <button id="ledButton" style="background-color:#808080;width:140px;height:40px" onclick="toggleLED()"><b>Lights</b></button>
</p>
<p style="text-align:center;color:#5087f5;">Battery = <span id="batteryValue">0</span>%</p>
<div class="bottom-container">
  <img src="/logo.png" style="width:70px;height:70px;">
</div>
<script>
  var port = parseInt(location.port || '80', 10) + 1;
  document.getElementById('stream').src =
    location.protocol + '//' + location.hostname + ':' + port + '/stream';

  var joy = new JoyStick('joystickDiv', {
    'title': 'joystick',
    'width': 200,
    'height': 200,
    'internalFillColor': '#82AE32',
    'internalStrokeColor': '#085C4D',
    'externalStrokeColor': '#085C4D'
  });

  setInterval(function () {
    var xhttp = new XMLHttpRequest();
    xhttp.open('GET', '/joycontrol?x=' + joy.GetX() + '&y=' + joy.GetY(), true);
    xhttp.send();
  }, 100);

  function updateBattery() {
    var xhttp = new XMLHttpRequest();
    xhttp.onreadystatechange = function () {
      if (this.readyState == 4 && this.status == 200) {
        document.getElementById('batteryValue').innerText = this.responseText;
      }
    };
    xhttp.open('GET', '/battery', true);
    xhttp.send();
  }
  setInterval(updateBattery, 30000);
  updateBattery();

  var ledState = false;
  function toggleLED() {
    ledState = !ledState;
    var xhttp = new XMLHttpRequest();
    xhttp.open('GET', '/toggle_led?' + new Date().getTime(), true);
    xhttp.send();
    document.getElementById('ledButton').style.backgroundColor = ledState ? '#085C4D' : '#808080';
  }
</script>
</body>
</html>
"#;
